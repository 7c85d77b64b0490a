use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

use crate::error::AppError;

/// Server-rendered pages. Sources are compiled into the binary.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("login.html", include_str!("../templates/login.html"))?;
        env.add_template("register.html", include_str!("../templates/register.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<Html<String>, AppError> {
        let html = self.env.get_template(name)?.render(ctx)?;
        Ok(Html(html))
    }
}

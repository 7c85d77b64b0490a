//! One chat turn, from validated request to persisted reply.
//!
//! The user's message is written before the provider is called and the
//! assistant's reply only after the provider answered, so a failed call
//! leaves the user turn in place and no assistant row behind. Retrying is
//! left to the client.

use std::sync::Arc;

use nova_db::Database;
use nova_db::models::DocumentScope;
use nova_provider::{ChatProvider, CompletionRequest, SamplingParams};
use nova_types::api::SendMessageRequest;
use nova_types::models::Role;
use tracing::{debug, info, warn};

use crate::blocking;
use crate::context::{self, ContextConfig, TurnInputs};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Received,
    Validated,
    UserTurnPersisted,
    ContextAssembled,
    ProviderInvoked,
    AssistantTurnPersisted,
    Responded,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub response: String,
    pub citations: Vec<String>,
}

#[derive(Debug)]
struct ValidTurn {
    chat_id: String,
    message: String,
    is_new_chat: bool,
}

fn validate(req: SendMessageRequest) -> Result<ValidTurn, AppError> {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("No message provided".into()))?;
    let chat_id = req
        .chat_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("No chat ID provided".into()))?;

    Ok(ValidTurn {
        chat_id,
        message,
        is_new_chat: req.is_new_chat,
    })
}

pub struct TurnOrchestrator {
    db: Arc<Database>,
    provider: Arc<dyn ChatProvider>,
    context: ContextConfig,
    sampling: SamplingParams,
}

impl TurnOrchestrator {
    pub fn new(
        db: Arc<Database>,
        provider: Arc<dyn ChatProvider>,
        context: ContextConfig,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            db,
            provider,
            context,
            sampling,
        }
    }

    pub fn context_config(&self) -> &ContextConfig {
        &self.context
    }

    /// Runs one turn for `user_id`. Every store access is scoped to that user.
    pub async fn run(&self, user_id: &str, req: SendMessageRequest) -> Result<TurnReply, AppError> {
        debug!(stage = ?TurnStage::Received, "Turn received");
        let turn = validate(req)?;

        let mut stage = TurnStage::Validated;
        debug!(chat_id = %turn.chat_id, stage = ?stage, "Turn validated");

        match self.execute(user_id, &turn, &mut stage).await {
            Ok(reply) => {
                debug!(chat_id = %turn.chat_id, stage = ?TurnStage::Responded, "Turn complete");
                Ok(reply)
            }
            Err(e) => {
                warn!(
                    chat_id = %turn.chat_id,
                    stage = ?TurnStage::Errored,
                    last_stage = ?stage,
                    error = %e,
                    "Turn errored"
                );
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        user_id: &str,
        turn: &ValidTurn,
        stage: &mut TurnStage,
    ) -> Result<TurnReply, AppError> {
        let uid = user_id.to_string();
        let cid = turn.chat_id.clone();
        let content = turn.message.clone();
        let user_row = blocking(&self.db, move |db| {
            db.append_message(&uid, &cid, Role::User, &content)
        })
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;
        *stage = TurnStage::UserTurnPersisted;
        debug!(chat_id = %turn.chat_id, message_id = user_row.id, stage = ?stage, "User turn persisted");

        let uid = user_id.to_string();
        let cid = turn.chat_id.clone();
        let marker = self.context.upload_marker.clone();
        let include_documents = self.context.include_documents;
        let (mut history, documents) = blocking(&self.db, move |db| {
            let history = db.list_messages(&uid, &cid)?;
            let documents = if include_documents {
                db.list_documents(
                    &uid,
                    DocumentScope::AssociatedWith {
                        chat_id: &cid,
                        marker: &marker,
                    },
                )?
            } else {
                Vec::new()
            };
            Ok((history, documents))
        })
        .await?;
        history.retain(|m| m.id != user_row.id);

        let messages = context::assemble(
            &self.context,
            &TurnInputs {
                history: &history,
                documents: &documents,
                user_message: &turn.message,
                is_new_chat: turn.is_new_chat,
            },
        );
        *stage = TurnStage::ContextAssembled;
        debug!(
            chat_id = %turn.chat_id,
            entries = messages.len(),
            documents = documents.len(),
            stage = ?stage,
            "Context assembled"
        );

        let completion = self
            .provider
            .complete(&CompletionRequest {
                messages,
                sampling: self.sampling,
            })
            .await?;
        *stage = TurnStage::ProviderInvoked;

        let uid = user_id.to_string();
        let cid = turn.chat_id.clone();
        let reply = completion.text.clone();
        blocking(&self.db, move |db| {
            db.append_message(&uid, &cid, Role::Assistant, &reply)
        })
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;
        *stage = TurnStage::AssistantTurnPersisted;
        info!(chat_id = %turn.chat_id, citations = completion.citations.len(), "Assistant turn persisted");

        Ok(TurnReply {
            response: completion.text,
            citations: completion.citations,
        })
    }
}

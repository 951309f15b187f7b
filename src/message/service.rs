use async_trait::async_trait;
use bytes::Bytes;
use log::error;
use mongodb::bson::Document;

use crate::actor::{ActorRef, Caller};
use crate::conversation::model::ConversationDto;
use crate::conversation::{self, BroadcastTarget};
use crate::fanout::FanoutResolver;
use crate::integration::storage::Storage;

use super::model::{
    Attachment, ConversationPage, Message, MessageDto, Page, SendRequest, Sender,
};
use super::{Id, Repository};

#[async_trait]
pub trait MessageService {
    /// The full send pipeline: resolve-or-create, fan out, ensure
    /// participants, upload, persist, count, summarize.
    ///
    /// Not safe to blindly retry against an existing conversation: the
    /// message insert is idempotent per id but the unread increment is not,
    /// so a retry after an ambiguous failure can double-count.
    async fn send(&self, caller: &Caller, req: SendRequest) -> super::Result<MessageDto>;

    /// Conversation plus one chronological page of messages. Opening it
    /// marks everything read for the caller and resets their counter.
    async fn open_conversation(
        &self,
        caller: &Caller,
        id: &conversation::Id,
        page: Page,
    ) -> super::Result<ConversationPage>;

    async fn mark_all_read(&self, caller: &Caller, id: &conversation::Id) -> super::Result<u64>;

    async fn mark_all_delivered(
        &self,
        caller: &Caller,
        id: &conversation::Id,
    ) -> super::Result<u64>;

    async fn edit(&self, caller: &Caller, id: &Id, text: &str) -> super::Result<MessageDto>;

    /// Recounts unread from the messages themselves, bypassing the cached
    /// counter map.
    async fn recompute_unread(
        &self,
        id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64>;
}

#[derive(Clone)]
pub struct MessageServiceImpl {
    repo: Repository,
    conversations: conversation::Service,
    fanout: FanoutResolver,
    storage: Option<Storage>,
}

impl MessageServiceImpl {
    pub fn new(
        repo: Repository,
        conversations: conversation::Service,
        fanout: FanoutResolver,
        storage: Option<Storage>,
    ) -> Self {
        Self {
            repo,
            conversations,
            fanout,
            storage,
        }
    }

    async fn broadcast_name(&self, target: &BroadcastTarget) -> super::Result<String> {
        let name = match target {
            BroadcastTarget::AllStudents => "All Students".to_string(),
            BroadcastTarget::AllEmployees => "All Employees".to_string(),
            BroadcastTarget::SpecificClass { class_id } => {
                self.fanout.class_by_id(class_id).await?.name
            }
            BroadcastTarget::SpecificStudent { student_id } => {
                self.fanout
                    .individual(&ActorRef::new(student_id, crate::actor::Kind::Student))
                    .await?
                    .display_name
            }
            BroadcastTarget::SpecificEmployee { employee_id } => {
                self.fanout
                    .individual(&ActorRef::new(employee_id, crate::actor::Kind::Employee))
                    .await?
                    .display_name
            }
        };
        Ok(name)
    }

    /// Resolves the addressed conversation and the concrete recipient list.
    /// All lookups fail before anything is written.
    async fn resolve_target(
        &self,
        caller: &Caller,
        req: &SendRequest,
    ) -> super::Result<(conversation::model::Conversation, Vec<ActorRef>)> {
        if let Some(id) = &req.conversation_id {
            let conv = self
                .conversations
                .find_for_participant(id, &caller.actor)
                .await?;
            let recipients = FanoutResolver::participants(&conv, &caller.actor);
            return Ok((conv, recipients));
        }

        if let Some(target) = &req.broadcast {
            let recipients: Vec<ActorRef> = self
                .fanout
                .broadcast(target)
                .await?
                .into_iter()
                .map(|p| p.actor)
                .collect();
            let name = self.broadcast_name(target).await?;
            let conv = self
                .conversations
                .resolve_or_create_broadcast(target.clone(), &caller.actor, name)
                .await?;
            return Ok((conv, recipients));
        }

        if let Some(class_name) = &req.class_name {
            let class = self.fanout.class_by_name(&caller.actor, class_name).await?;
            let recipients: Vec<ActorRef> = self
                .fanout
                .class(&class)
                .await?
                .into_iter()
                .map(|p| p.actor)
                .collect();
            let conv = self
                .conversations
                .resolve_or_create_group(&caller.actor, &class, None)
                .await?;
            return Ok((conv, recipients));
        }

        if let Some(recipient) = &req.recipient {
            let profile = self.fanout.individual(recipient).await?;
            let conv = self
                .conversations
                .resolve_or_create_individual(&caller.actor, recipient, &profile.display_name)
                .await?;
            return Ok((conv, vec![profile.actor]));
        }

        Err(conversation::Error::MissingTarget.into())
    }

    /// Sequential, best-effort uploads. A failed file is logged and dropped;
    /// the send continues with whatever made it.
    async fn upload_attachments(
        &self,
        storage: &Storage,
        conversation_id: &conversation::Id,
        req: &SendRequest,
    ) -> Vec<Attachment> {
        let mut attachments = Vec::with_capacity(req.attachments.len());

        for upload in &req.attachments {
            let data = Bytes::from(upload.data.clone());
            let size_bytes = data.len() as u64;

            match storage
                .upload(data, &upload.name, &conversation_id.to_string())
                .await
            {
                Ok(stored) => attachments.push(Attachment {
                    name: upload.name.clone(),
                    url: stored.url,
                    external_id: stored.external_id,
                    mime_type: upload.mime_type.clone(),
                    size_bytes,
                    uploaded_at: chrono::Utc::now().timestamp(),
                }),
                Err(e) => error!("dropping attachment {}: upload failed: {e:?}", upload.name),
            }
        }

        attachments
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn send(&self, caller: &Caller, req: SendRequest) -> super::Result<MessageDto> {
        req.validate()?;

        let wants_attachments = !req.attachments.is_empty();
        if wants_attachments && self.storage.is_none() {
            return Err(super::Error::StorageUnavailable);
        }

        let (conv, recipients) = self.resolve_target(caller, &req).await?;

        if wants_attachments && !conv.settings.attachments_allowed {
            return Err(super::Error::AttachmentsDisabled);
        }

        if let Some(reply_to) = &req.reply_to {
            let parent = self
                .repo
                .find_by_id(reply_to)
                .await
                .map_err(|_| super::Error::BadReplyTo(reply_to.clone()))?;
            if parent.conversation_id.ne(&conv.id) {
                return Err(super::Error::BadReplyTo(reply_to.clone()));
            }
        }

        self.conversations
            .ensure_participants(&conv, &recipients)
            .await?;

        let attachments = match &self.storage {
            Some(storage) if wants_attachments => {
                self.upload_attachments(storage, &conv.id, &req).await
            }
            _ => vec![],
        };

        let message = Message::new(
            conv.id.clone(),
            Sender {
                actor: caller.actor.clone(),
                display_name: caller.display_name.clone(),
            },
            req.text.clone(),
            attachments,
            req.reply_to.clone(),
            Document::new(),
        )?;

        self.repo.insert(&message).await?;

        self.conversations
            .increment_unread_except(&conv.id, &caller.actor)
            .await?;

        // second write on purpose; on failure the recount definition repairs
        if let Err(e) = self
            .conversations
            .note_message(&conv.id, &message.last_message())
            .await
        {
            error!("summary update failed for conversation {}: {e:?}", conv.id);
        }

        Ok(message.into())
    }

    async fn open_conversation(
        &self,
        caller: &Caller,
        id: &conversation::Id,
        page: Page,
    ) -> super::Result<ConversationPage> {
        self.conversations
            .find_for_participant(id, &caller.actor)
            .await?;

        let messages = self
            .repo
            .find_by_conversation(id, page.skip(), page.limit())
            .await?;

        self.repo.mark_all_read(id, &caller.actor).await?;
        self.conversations.reset_unread(id, &caller.actor).await?;

        let conv = self.conversations.find_by_id(id).await?;
        Ok(ConversationPage {
            conversation: ConversationDto::for_actor(&conv, &caller.actor),
            messages: messages.into_iter().map(Into::into).collect(),
            page: page.page,
            limit: page.limit(),
        })
    }

    async fn mark_all_read(&self, caller: &Caller, id: &conversation::Id) -> super::Result<u64> {
        self.conversations
            .find_for_participant(id, &caller.actor)
            .await?;

        let marked = self.repo.mark_all_read(id, &caller.actor).await?;
        self.conversations.reset_unread(id, &caller.actor).await?;
        Ok(marked)
    }

    async fn mark_all_delivered(
        &self,
        caller: &Caller,
        id: &conversation::Id,
    ) -> super::Result<u64> {
        self.conversations
            .find_for_participant(id, &caller.actor)
            .await?;

        self.repo.mark_all_delivered(id, &caller.actor).await
    }

    async fn edit(&self, caller: &Caller, id: &Id, text: &str) -> super::Result<MessageDto> {
        if text.trim().is_empty() {
            return Err(super::Error::EmptyMessage);
        }

        let message = self.repo.find_by_id(id).await?;
        if message.sender.actor.ne(&caller.actor) {
            return Err(super::Error::NotSender);
        }

        self.repo
            .set_text(id, text, chrono::Utc::now().timestamp())
            .await?;

        self.repo.find_by_id(id).await.map(Into::into)
    }

    async fn recompute_unread(
        &self,
        id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64> {
        self.repo.count_unread(id, actor).await
    }
}

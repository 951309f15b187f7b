use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::actor::ActorRef;
use crate::directory::model::SchoolClass;
use crate::message;

use super::model::{Conversation, ConversationDto, LastMessage, Stats};
use super::repository::DedupKey;
use super::{BroadcastTarget, Id, Kind, Repository};

#[derive(Debug, Default, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub kind: Option<Kind>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

#[async_trait]
pub trait ConversationService {
    /// Returns the creator's existing active broadcast for this target, or
    /// creates one with the creator as sole participant.
    async fn resolve_or_create_broadcast(
        &self,
        target: BroadcastTarget,
        creator: &ActorRef,
        name: String,
    ) -> super::Result<Conversation>;

    async fn resolve_or_create_individual(
        &self,
        creator: &ActorRef,
        recipient: &ActorRef,
        recipient_label: &str,
    ) -> super::Result<Conversation>;

    async fn resolve_or_create_group(
        &self,
        creator: &ActorRef,
        class: &SchoolClass,
        label: Option<&str>,
    ) -> super::Result<Conversation>;

    async fn find_all(
        &self,
        actor: &ActorRef,
        filter: &ListFilter,
    ) -> super::Result<Vec<ConversationDto>>;

    /// Lookup without the active flag; a soft-deleted conversation keeps its
    /// history retrievable.
    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation>;

    async fn find_for_participant(&self, id: &Id, actor: &ActorRef)
    -> super::Result<Conversation>;

    async fn ensure_participants(
        &self,
        conversation: &Conversation,
        recipients: &[ActorRef],
    ) -> super::Result<()>;

    /// Bumps the counter of every current participant except the sender,
    /// in one atomic write.
    async fn increment_unread_except(&self, id: &Id, sender: &ActorRef) -> super::Result<()>;

    async fn reset_unread(&self, id: &Id, actor: &ActorRef) -> super::Result<()>;

    async fn note_message(&self, id: &Id, last: &LastMessage) -> super::Result<()>;

    async fn delete(&self, id: &Id, caller: &ActorRef) -> super::Result<()>;

    async fn set_archived(&self, id: &Id, caller: &ActorRef, archived: bool)
    -> super::Result<()>;

    async fn stats_for(&self, actor: &ActorRef) -> super::Result<Stats>;
}

#[derive(Clone)]
pub struct ConversationServiceImpl {
    repo: Repository,
    message_repo: message::Repository,
}

impl ConversationServiceImpl {
    pub fn new(repo: Repository, message_repo: message::Repository) -> Self {
        Self { repo, message_repo }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn resolve_or_create_broadcast(
        &self,
        target: BroadcastTarget,
        creator: &ActorRef,
        name: String,
    ) -> super::Result<Conversation> {
        let new = Conversation::broadcast(target.clone(), creator.clone(), name);
        self.repo
            .find_or_create(
                DedupKey::Broadcast {
                    target: &target,
                    creator,
                },
                new,
            )
            .await
    }

    async fn resolve_or_create_individual(
        &self,
        creator: &ActorRef,
        recipient: &ActorRef,
        recipient_label: &str,
    ) -> super::Result<Conversation> {
        let new = Conversation::individual(
            creator.clone(),
            recipient.clone(),
            recipient_label.to_string(),
        );
        self.repo
            .find_or_create(DedupKey::Individual { creator, recipient }, new)
            .await
    }

    async fn resolve_or_create_group(
        &self,
        creator: &ActorRef,
        class: &SchoolClass,
        label: Option<&str>,
    ) -> super::Result<Conversation> {
        let name = label.unwrap_or(&class.name).to_string();
        let new = Conversation::group(creator.clone(), class, name);
        self.repo
            .find_or_create(
                DedupKey::Group {
                    creator,
                    class_id: &class.class_id,
                },
                new,
            )
            .await
    }

    async fn find_all(
        &self,
        actor: &ActorRef,
        filter: &ListFilter,
    ) -> super::Result<Vec<ConversationDto>> {
        let conversations = self.repo.find_active_for(actor).await?;

        let search = filter.search.as_deref().map(str::to_lowercase);
        let dtos = conversations
            .iter()
            .filter(|c| filter.kind.is_none_or(|k| c.kind == k))
            .filter(|c| {
                search
                    .as_deref()
                    .is_none_or(|q| c.name.to_lowercase().contains(q))
            })
            .filter(|c| !filter.unread_only || c.unread_for(actor) > 0)
            .map(|c| ConversationDto::for_actor(c, actor))
            .collect();

        Ok(dtos)
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation> {
        self.repo.find_by_id(id).await
    }

    async fn find_for_participant(
        &self,
        id: &Id,
        actor: &ActorRef,
    ) -> super::Result<Conversation> {
        let conversation = self.repo.find_by_id(id).await?;
        if !conversation.has_participant(actor) {
            return Err(super::Error::NotParticipant);
        }
        Ok(conversation)
    }

    async fn ensure_participants(
        &self,
        conversation: &Conversation,
        recipients: &[ActorRef],
    ) -> super::Result<()> {
        let missing = conversation.missing_participants(recipients);
        self.repo.add_participants(&conversation.id, &missing).await
    }

    async fn increment_unread_except(&self, id: &Id, sender: &ActorRef) -> super::Result<()> {
        // re-read so participants ensured a moment ago are counted too
        let conversation = self.repo.find_by_id(id).await?;
        let keys = conversation.recipient_keys(sender);
        self.repo.increment_unread(id, &keys).await
    }

    async fn reset_unread(&self, id: &Id, actor: &ActorRef) -> super::Result<()> {
        self.repo.reset_unread(id, &actor.key()).await
    }

    async fn note_message(&self, id: &Id, last: &LastMessage) -> super::Result<()> {
        self.repo.update_summary(id, last).await
    }

    async fn delete(&self, id: &Id, caller: &ActorRef) -> super::Result<()> {
        let conversation = self.repo.find_by_id(id).await?;
        if conversation.creator.ne(caller) {
            return Err(super::Error::NotCreator);
        }
        self.repo.set_active(id, false).await
    }

    async fn set_archived(
        &self,
        id: &Id,
        caller: &ActorRef,
        archived: bool,
    ) -> super::Result<()> {
        let conversation = self.repo.find_by_id(id).await?;
        if conversation.creator.ne(caller) {
            return Err(super::Error::NotCreator);
        }
        self.repo.set_archived(id, archived).await
    }

    async fn stats_for(&self, actor: &ActorRef) -> super::Result<Stats> {
        let conversations = self.repo.find_active_for(actor).await?;

        let mut stats = Stats {
            total_conversations: conversations.len(),
            ..Stats::default()
        };

        for c in &conversations {
            stats.total_unread += c.unread_for(actor);
            match c.kind {
                Kind::Group => stats.groups += 1,
                Kind::Individual => stats.individuals += 1,
                Kind::Broadcast => stats.broadcasts += 1,
            }
        }

        let midnight = Utc
            .from_utc_datetime(&Utc::now().date_naive().and_hms_opt(0, 0, 0).expect("midnight"))
            .timestamp();
        stats.messages_today = self.message_repo.count_sent_since(midnight).await?;

        Ok(stats)
    }
}

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc, to_bson, to_document};
use mongodb::options::ReturnDocument;

use crate::actor::{self, ActorRef};

use super::model::{Conversation, LastMessage, Participant};
use super::{BroadcastTarget, Id, Kind};

const CONVERSATIONS_COLLECTION: &str = "conversations";

/// Counter updates address the map by `unread.<kind>:<id>`. A dot in the id
/// would make mongo nest the path and a leading `$` would make it an
/// operator, so such ids never reach an update document.
fn unread_path(key: &actor::Key) -> super::Result<String> {
    let id = &key.actor().id.0;
    if id.contains('.') || id.starts_with('$') {
        return Err(super::Error::InvalidCounterKey(id.clone()));
    }
    Ok(format!("unread.{key}"))
}

/// The tuple a resolve-or-create call matches an existing conversation on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DedupKey<'a> {
    /// Active, non-archived broadcast with the same target and creator.
    Broadcast {
        target: &'a BroadcastTarget,
        creator: &'a ActorRef,
    },
    Individual {
        creator: &'a ActorRef,
        recipient: &'a ActorRef,
    },
    Group {
        creator: &'a ActorRef,
        class_id: &'a str,
    },
}

#[async_trait]
pub trait ConversationRepository {
    /// Atomic find-or-create on the dedup key. A pre-existing match is
    /// returned unchanged; repeat calls cannot rename a conversation.
    async fn find_or_create(&self, key: DedupKey<'_>, new: Conversation)
    -> super::Result<Conversation>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation>;

    /// Active conversations the actor participates in, newest activity first.
    async fn find_active_for(&self, actor: &ActorRef) -> super::Result<Vec<Conversation>>;

    async fn add_participants(&self, id: &Id, missing: &[Participant]) -> super::Result<()>;

    /// One `$inc` touching every key; concurrent sends cannot lose updates.
    async fn increment_unread(&self, id: &Id, keys: &[actor::Key]) -> super::Result<()>;

    async fn reset_unread(&self, id: &Id, key: &actor::Key) -> super::Result<()>;

    async fn update_summary(&self, id: &Id, last: &LastMessage) -> super::Result<()>;

    async fn set_active(&self, id: &Id, active: bool) -> super::Result<()>;

    async fn set_archived(&self, id: &Id, archived: bool) -> super::Result<()>;
}

pub struct MongoConversationRepository {
    col: mongodb::Collection<Conversation>,
}

impl MongoConversationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            col: db.collection(CONVERSATIONS_COLLECTION),
        }
    }

    fn dedup_filter(key: &DedupKey<'_>) -> super::Result<Document> {
        let filter = match key {
            DedupKey::Broadcast { target, creator } => doc! {
                "kind": Kind::Broadcast.as_str(),
                "broadcast_target": to_bson(target)?,
                "creator.id": &creator.id.0,
                "creator.kind": creator.kind,
                "is_active": true,
                "is_archived": false,
            },
            DedupKey::Individual { creator, recipient } => doc! {
                "kind": Kind::Individual.as_str(),
                "creator.id": &creator.id.0,
                "creator.kind": creator.kind,
                "recipient.id": &recipient.id.0,
                "recipient.kind": recipient.kind,
            },
            DedupKey::Group { creator, class_id } => doc! {
                "kind": Kind::Group.as_str(),
                "creator.id": &creator.id.0,
                "creator.kind": creator.kind,
                "class_id": *class_id,
            },
        };
        Ok(filter)
    }
}

#[async_trait]
impl ConversationRepository for MongoConversationRepository {
    async fn find_or_create(
        &self,
        key: DedupKey<'_>,
        new: Conversation,
    ) -> super::Result<Conversation> {
        let filter = Self::dedup_filter(&key)?;

        let conversation = self
            .col
            .find_one_and_update(filter, doc! { "$setOnInsert": to_document(&new)? })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        conversation.ok_or(super::Error::NotCreated)
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation> {
        self.col
            .find_one(doc! { "_id": id.clone() })
            .await?
            .ok_or(super::Error::NotFound(Some(id.to_owned())))
    }

    async fn find_active_for(&self, actor: &ActorRef) -> super::Result<Vec<Conversation>> {
        let cursor = self
            .col
            .find(doc! {
                "is_active": true,
                "participants": { "$elemMatch": {
                    "actor.id": &actor.id.0,
                    "actor.kind": actor.kind,
                }},
            })
            .sort(doc! { "last_activity": -1 })
            .await?;

        let conversations: Vec<Conversation> = cursor.try_collect().await?;
        Ok(conversations)
    }

    async fn add_participants(&self, id: &Id, missing: &[Participant]) -> super::Result<()> {
        if missing.is_empty() {
            return Ok(());
        }

        self.col
            .update_one(
                doc! { "_id": id.clone() },
                doc! { "$push": { "participants": { "$each": to_bson(missing)? } } },
            )
            .await?;
        Ok(())
    }

    async fn increment_unread(&self, id: &Id, keys: &[actor::Key]) -> super::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut inc = Document::new();
        for key in keys {
            inc.insert(unread_path(key)?, 1_i64);
        }

        self.col
            .update_one(doc! { "_id": id.clone() }, doc! { "$inc": inc })
            .await?;
        Ok(())
    }

    async fn reset_unread(&self, id: &Id, key: &actor::Key) -> super::Result<()> {
        let mut set = Document::new();
        set.insert(unread_path(key)?, 0_i64);

        self.col
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": set })
            .await?;
        Ok(())
    }

    async fn update_summary(&self, id: &Id, last: &LastMessage) -> super::Result<()> {
        self.col
            .update_one(
                doc! { "_id": id.clone() },
                doc! {
                    "$set": {
                        "last_message": to_bson(last)?,
                        "last_activity": last.at,
                    },
                    "$inc": { "message_count": 1_i64 },
                },
            )
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: &Id, active: bool) -> super::Result<()> {
        self.col
            .update_one(
                doc! { "_id": id.clone() },
                doc! { "$set": { "is_active": active } },
            )
            .await?;
        Ok(())
    }

    async fn set_archived(&self, id: &Id, archived: bool) -> super::Result<()> {
        self.col
            .update_one(
                doc! { "_id": id.clone() },
                doc! { "$set": { "is_archived": archived } },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use testcontainers_modules::{mongo::Mongo, testcontainers::runners::AsyncRunner};

    use crate::actor::{ActorRef, Kind as ActorKind};
    use crate::conversation::model::Conversation;
    use crate::integration::db;

    use super::*;

    #[test]
    fn should_refuse_path_breaking_counter_keys() {
        let dotted = ActorRef::new("a.b", ActorKind::Student).key();
        assert!(matches!(
            unread_path(&dotted),
            Err(crate::conversation::Error::InvalidCounterKey(_))
        ));

        let operator = ActorRef::new("$inc", ActorKind::Student).key();
        assert!(unread_path(&operator).is_err());

        let plain = ActorRef::new("s-1", ActorKind::Student).key();
        assert_eq!(unread_path(&plain).unwrap(), "unread.student:s-1");
    }

    // The rest need a container runtime; run with `cargo test -- --ignored`.

    fn all_students_key(c: &ActorRef) -> DedupKey<'_> {
        DedupKey::Broadcast {
            target: &BroadcastTarget::AllStudents,
            creator: c,
        }
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn should_dedup_broadcasts_per_creator() {
        let node = Mongo::default().start().await.unwrap();
        let db = db::Config::test(&node).await.connect();
        let repo = MongoConversationRepository::new(&db);

        let creator = ActorRef::new("a1", ActorKind::Admin);

        let first = repo
            .find_or_create(
                all_students_key(&creator),
                Conversation::broadcast(
                    BroadcastTarget::AllStudents,
                    creator.clone(),
                    "All Students".into(),
                ),
            )
            .await
            .unwrap();

        let second = repo
            .find_or_create(
                all_students_key(&creator),
                Conversation::broadcast(
                    BroadcastTarget::AllStudents,
                    creator.clone(),
                    "Renamed".into(),
                ),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        // a repeat call never renames
        assert_eq!(second.name, "All Students");

        let other = ActorRef::new("a2", ActorKind::Admin);
        let third = repo
            .find_or_create(
                all_students_key(&other),
                Conversation::broadcast(
                    BroadcastTarget::AllStudents,
                    other.clone(),
                    "All Students".into(),
                ),
            )
            .await
            .unwrap();
        assert_ne!(first.id, third.id);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn should_increment_and_reset_unread_atomically() {
        let node = Mongo::default().start().await.unwrap();
        let db = db::Config::test(&node).await.connect();
        let repo = MongoConversationRepository::new(&db);

        let creator = ActorRef::new("e1", ActorKind::Employee);
        let s1 = ActorRef::new("s1", ActorKind::Student);
        let s2 = ActorRef::new("s2", ActorKind::Student);

        let conv = repo
            .find_or_create(
                DedupKey::Broadcast {
                    target: &BroadcastTarget::AllStudents,
                    creator: &creator,
                },
                Conversation::broadcast(
                    BroadcastTarget::AllStudents,
                    creator.clone(),
                    "All Students".into(),
                ),
            )
            .await
            .unwrap();

        let keys = vec![s1.key(), s2.key()];
        tokio::try_join!(
            repo.increment_unread(&conv.id, &keys),
            repo.increment_unread(&conv.id, &keys)
        )
        .unwrap();

        let conv = repo.find_by_id(&conv.id).await.unwrap();
        assert_eq!(conv.unread_for(&s1), 2);
        assert_eq!(conv.unread_for(&s2), 2);
        assert_eq!(conv.unread_for(&creator), 0);

        repo.reset_unread(&conv.id, &s1.key()).await.unwrap();
        let conv = repo.find_by_id(&conv.id).await.unwrap();
        assert_eq!(conv.unread_for(&s1), 0);
        assert_eq!(conv.unread_for(&s2), 2);
    }
}

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};

use crate::actor::ActorRef;
use crate::conversation;

use super::model::{Message, Receipt};
use super::{Id, Status};

const MESSAGES_COLLECTION: &str = "messages";

#[async_trait]
pub trait MessageRepository {
    async fn insert(&self, message: &Message) -> super::Result<Id>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Message>;

    /// Chronological page of a conversation's history.
    async fn find_by_conversation(
        &self,
        conversation_id: &conversation::Id,
        skip: u64,
        limit: i64,
    ) -> super::Result<Vec<Message>>;

    /// Appends the actor's read receipt to every message they have not read
    /// yet and flips those messages to `read`. Safe to repeat.
    async fn mark_all_read(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64>;

    /// Like `mark_all_read` but only touches messages still in `sent`.
    async fn mark_all_delivered(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64>;

    /// The authoritative unread count: messages the actor neither sent nor read.
    async fn count_unread(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64>;

    /// Returns the raw driver error so callers outside this module can
    /// propagate it through their own error type.
    async fn count_sent_since(&self, since: i64) -> mongodb::error::Result<u64>;

    async fn set_text(&self, id: &Id, text: &str, edited_at: i64) -> super::Result<bool>;
}

pub struct MongoMessageRepository {
    col: mongodb::Collection<Message>,
}

impl MongoMessageRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            col: db.collection(MESSAGES_COLLECTION),
        }
    }
}

#[async_trait]
impl MessageRepository for MongoMessageRepository {
    async fn insert(&self, message: &Message) -> super::Result<Id> {
        self.col.insert_one(message).await?;
        Ok(message.id.clone())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Message> {
        self.col
            .find_one(doc! { "_id": id.clone() })
            .await?
            .ok_or(super::Error::NotFound(id.to_owned()))
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &conversation::Id,
        skip: u64,
        limit: i64,
    ) -> super::Result<Vec<Message>> {
        let cursor = self
            .col
            .find(doc! { "conversation_id": conversation_id.clone() })
            .sort(doc! { "created_at": 1 })
            .skip(skip)
            .limit(limit)
            .await?;

        let messages: Vec<Message> = cursor.try_collect().await?;
        Ok(messages)
    }

    async fn mark_all_read(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64> {
        let receipt = Receipt::now(actor.clone());
        let result = self
            .col
            .update_many(
                doc! {
                    "conversation_id": conversation_id.clone(),
                    "read_by": { "$not": { "$elemMatch": {
                        "actor.id": &actor.id.0,
                        "actor.kind": actor.kind,
                    }}},
                },
                doc! {
                    "$push": { "read_by": to_bson(&receipt).map_err(mongodb::error::Error::from)? },
                    "$set": { "status": "read" },
                },
            )
            .await?;

        Ok(result.modified_count)
    }

    async fn mark_all_delivered(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64> {
        let receipt = Receipt::now(actor.clone());
        let result = self
            .col
            .update_many(
                doc! {
                    "conversation_id": conversation_id.clone(),
                    "status": "sent",
                    "delivered_to": { "$not": { "$elemMatch": {
                        "actor.id": &actor.id.0,
                        "actor.kind": actor.kind,
                    }}},
                },
                doc! {
                    "$push": { "delivered_to": to_bson(&receipt).map_err(mongodb::error::Error::from)? },
                    "$set": { "status": "delivered" },
                },
            )
            .await?;

        Ok(result.modified_count)
    }

    async fn count_unread(
        &self,
        conversation_id: &conversation::Id,
        actor: &ActorRef,
    ) -> super::Result<u64> {
        let count = self
            .col
            .count_documents(doc! {
                "conversation_id": conversation_id.clone(),
                "$or": [
                    { "sender.actor.id": { "$ne": &actor.id.0 } },
                    { "sender.actor.kind": { "$ne": actor.kind } },
                ],
                "read_by": { "$not": { "$elemMatch": {
                    "actor.id": &actor.id.0,
                    "actor.kind": actor.kind,
                }}},
            })
            .await?;

        Ok(count)
    }

    async fn count_sent_since(&self, since: i64) -> mongodb::error::Result<u64> {
        let count = self
            .col
            .count_documents(doc! { "created_at": { "$gte": since } })
            .await?;
        Ok(count)
    }

    async fn set_text(&self, id: &Id, text: &str, edited_at: i64) -> super::Result<bool> {
        let result = self
            .col
            .update_one(
                doc! { "_id": id.clone() },
                doc! { "$set": {
                    "text": text,
                    "is_edited": true,
                    "edited_at": edited_at,
                }},
            )
            .await?;

        Ok(result.modified_count > 0)
    }
}

#[cfg(test)]
mod test {
    use mongodb::bson::Document;
    use testcontainers_modules::{mongo::Mongo, testcontainers::runners::AsyncRunner};

    use crate::actor::{ActorRef, Kind as ActorKind};
    use crate::integration::db;
    use crate::message::model::Sender;

    use super::*;

    fn text_message(conversation_id: &conversation::Id, sender: &ActorRef, text: &str) -> Message {
        Message::new(
            conversation_id.clone(),
            Sender {
                actor: sender.clone(),
                display_name: sender.id.0.clone(),
            },
            Some(text.into()),
            vec![],
            None,
            Document::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn should_mark_all_read_idempotently() {
        let node = Mongo::default().start().await.unwrap();
        let db = db::Config::test(&node).await.connect();
        let repo = MongoMessageRepository::new(&db);

        let conversation_id = conversation::Id::random();
        let sender = ActorRef::new("e1", ActorKind::Employee);
        let reader = ActorRef::new("s1", ActorKind::Student);

        for i in 0..3 {
            repo.insert(&text_message(&conversation_id, &sender, &format!("m{i}")))
                .await
                .unwrap();
        }

        assert_eq!(repo.count_unread(&conversation_id, &reader).await.unwrap(), 3);

        let first = repo.mark_all_read(&conversation_id, &reader).await.unwrap();
        assert_eq!(first, 3);

        let second = repo.mark_all_read(&conversation_id, &reader).await.unwrap();
        assert_eq!(second, 0);

        assert_eq!(repo.count_unread(&conversation_id, &reader).await.unwrap(), 0);
        // the sender never counts their own messages as unread
        assert_eq!(repo.count_unread(&conversation_id, &sender).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn should_only_deliver_sent_messages() {
        let node = Mongo::default().start().await.unwrap();
        let db = db::Config::test(&node).await.connect();
        let repo = MongoMessageRepository::new(&db);

        let conversation_id = conversation::Id::random();
        let sender = ActorRef::new("e1", ActorKind::Employee);
        let reader = ActorRef::new("s1", ActorKind::Student);

        repo.insert(&text_message(&conversation_id, &sender, "first"))
            .await
            .unwrap();
        repo.mark_all_read(&conversation_id, &reader).await.unwrap();
        repo.insert(&text_message(&conversation_id, &sender, "second"))
            .await
            .unwrap();

        // only "second" is still in sent status
        let delivered = repo
            .mark_all_delivered(&conversation_id, &reader)
            .await
            .unwrap();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn should_page_chronologically() {
        let node = Mongo::default().start().await.unwrap();
        let db = db::Config::test(&node).await.connect();
        let repo = MongoMessageRepository::new(&db);

        let conversation_id = conversation::Id::random();
        let sender = ActorRef::new("e1", ActorKind::Employee);

        for i in 0..5 {
            let mut m = text_message(&conversation_id, &sender, &format!("m{i}"));
            m.created_at = 1000 + i;
            repo.insert(&m).await.unwrap();
        }

        let page = repo.find_by_conversation(&conversation_id, 2, 2).await.unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["m2", "m3"]);
    }
}

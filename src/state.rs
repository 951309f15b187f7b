use std::sync::Arc;

use log::warn;

use crate::conversation::repository::MongoConversationRepository;
use crate::conversation::service::ConversationServiceImpl;
use crate::directory::repository::MongoDirectory;
use crate::fanout::FanoutResolver;
use crate::integration;
use crate::integration::storage::Storage;
use crate::message::repository::MongoMessageRepository;
use crate::message::service::MessageServiceImpl;
use crate::{conversation, directory, message};

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: conversation::Service,
    pub message_service: message::Service,
    pub directory: directory::Directory,
    pub roster: directory::Roster,
}

impl AppState {
    pub async fn init(config: &integration::Config) -> integration::Result<Self> {
        let db = config.mongo.connect();

        let school = Arc::new(MongoDirectory::new(&db));
        let directory: directory::Directory = school.clone();
        let roster: directory::Roster = school;

        let storage: Option<Storage> = match &config.storage {
            Some(cfg) => Some(Arc::new(cfg.connect().await?)),
            None => {
                warn!("attachment storage is not configured; sends with attachments will be rejected");
                None
            }
        };

        let conversation_repo: conversation::Repository =
            Arc::new(MongoConversationRepository::new(&db));
        let message_repo: message::Repository = Arc::new(MongoMessageRepository::new(&db));

        let conversation_service: conversation::Service = Arc::new(ConversationServiceImpl::new(
            conversation_repo,
            message_repo.clone(),
        ));
        let message_service: message::Service = Arc::new(MessageServiceImpl::new(
            message_repo,
            conversation_service.clone(),
            FanoutResolver::new(directory.clone(), roster.clone()),
            storage,
        ));

        Ok(Self {
            conversation_service,
            message_service,
            directory,
            roster,
        })
    }
}

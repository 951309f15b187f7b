use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::actor::{self, ActorRef};
use crate::directory::model::SchoolClass;

use super::{BroadcastTarget, Id, Kind};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Participant {
    pub actor: ActorRef,
    pub joined_at: i64,
}

impl Participant {
    pub fn new(actor: ActorRef) -> Self {
        Self {
            actor,
            joined_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    pub attachments_allowed: bool,
    pub notify_on_message: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            attachments_allowed: true,
            notify_on_message: true,
        }
    }
}

/// Cached per-actor delivery counters. The authoritative definition lives in
/// the message store (`count_unread`); this map is what listings read.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UnreadCounters(HashMap<actor::Key, i64>);

impl UnreadCounters {
    pub fn get(&self, actor: &ActorRef) -> i64 {
        self.0.get(&actor.key()).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, actor: &ActorRef) {
        *self.0.entry(actor.key()).or_insert(0) += 1;
    }

    pub fn reset(&mut self, actor: &ActorRef) {
        self.0.insert(actor.key(), 0);
    }
}

/// Denormalized preview of the newest message.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub sender: ActorRef,
    pub at: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_target: Option<BroadcastTarget>,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ActorRef>,
    pub creator: ActorRef,
    pub is_active: bool,
    pub is_archived: bool,
    pub message_count: i64,
    pub last_message: Option<LastMessage>,
    pub last_activity: i64,
    pub unread: UnreadCounters,
    pub settings: Settings,
    pub created_at: i64,
}

impl Conversation {
    fn base(name: String, kind: Kind, creator: ActorRef) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Id::random(),
            name,
            kind,
            broadcast_target: None,
            participants: vec![Participant::new(creator.clone())],
            class_id: None,
            recipient: None,
            creator,
            is_active: true,
            is_archived: false,
            message_count: 0,
            last_message: None,
            last_activity: now,
            unread: UnreadCounters::default(),
            settings: Settings::default(),
            created_at: now,
        }
    }

    pub fn broadcast(target: BroadcastTarget, creator: ActorRef, name: String) -> Self {
        Self {
            broadcast_target: Some(target),
            ..Self::base(name, Kind::Broadcast, creator)
        }
    }

    /// The recipient joins immediately; there is no invitation step.
    /// A self-addressed conversation keeps a single participant entry.
    pub fn individual(creator: ActorRef, recipient: ActorRef, name: String) -> Self {
        let mut c = Self::base(name, Kind::Individual, creator);
        c.recipient = Some(recipient.clone());
        c.ensure_present(&recipient);
        c
    }

    pub fn group(creator: ActorRef, class: &SchoolClass, name: String) -> Self {
        Self {
            class_id: Some(class.class_id.clone()),
            ..Self::base(name, Kind::Group, creator)
        }
    }

    pub fn has_participant(&self, actor: &ActorRef) -> bool {
        self.participants.iter().any(|p| p.actor.eq(actor))
    }

    /// Appends iff no (id, kind) entry exists yet. Returns whether it appended.
    pub fn ensure_present(&mut self, actor: &ActorRef) -> bool {
        if self.has_participant(actor) {
            return false;
        }
        self.participants.push(Participant::new(actor.clone()));
        true
    }

    /// The subset of `recipients` that is not yet in the participant list.
    /// One membership set, then one pass; broadcast fan-out can be hundreds
    /// of actors.
    pub fn missing_participants(&self, recipients: &[ActorRef]) -> Vec<Participant> {
        let mut present: HashSet<&ActorRef> =
            self.participants.iter().map(|p| &p.actor).collect();

        recipients
            .iter()
            .filter(|r| present.insert(*r))
            .cloned()
            .map(Participant::new)
            .collect()
    }

    pub fn unread_for(&self, actor: &ActorRef) -> i64 {
        self.unread.get(actor)
    }

    /// Counter keys of every current participant except `sender`.
    pub fn recipient_keys(&self, sender: &ActorRef) -> Vec<actor::Key> {
        self.participants
            .iter()
            .filter(|p| p.actor.ne(sender))
            .map(|p| p.actor.key())
            .collect()
    }

    pub fn other_participants(&self, sender: &ActorRef) -> Vec<ActorRef> {
        self.participants
            .iter()
            .filter(|p| p.actor.ne(sender))
            .map(|p| p.actor.clone())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationDto {
    pub id: Id,
    pub name: String,
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_target: Option<BroadcastTarget>,
    pub participant_count: usize,
    pub is_archived: bool,
    pub message_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub last_activity: i64,
    pub time_ago: String,
    pub unread: i64,
}

impl ConversationDto {
    pub fn for_actor(c: &Conversation, actor: &ActorRef) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            kind: c.kind,
            broadcast_target: c.broadcast_target.clone(),
            participant_count: c.participants.len(),
            is_archived: c.is_archived,
            message_count: c.message_count,
            last_message: c.last_message.clone(),
            last_activity: c.last_activity,
            time_ago: time_ago(chrono::Utc::now().timestamp(), c.last_activity),
            unread: c.unread_for(actor),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub total_conversations: usize,
    pub total_unread: i64,
    pub messages_today: u64,
    pub groups: usize,
    pub individuals: usize,
    pub broadcasts: usize,
}

pub fn time_ago(now: i64, then: i64) -> String {
    let delta = (now - then).max(0);
    match delta {
        0..60 => "just now".into(),
        60..3600 => format!("{}m ago", delta / 60),
        3600..86400 => format!("{}h ago", delta / 3600),
        _ => format!("{}d ago", delta / 86400),
    }
}

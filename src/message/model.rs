use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

use crate::actor::ActorRef;
use crate::conversation;
use crate::conversation::model::LastMessage;

use super::{Id, Kind, Status};

pub const MAX_ATTACHMENTS: usize = 5;
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Common image, pdf, office document, text and archive types.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    "application/zip",
    "application/x-rar-compressed",
];

/// Text beyond this is presented as an announcement rather than a bubble.
const ANNOUNCEMENT_THRESHOLD: usize = 500;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub external_id: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_at: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Receipt {
    pub actor: ActorRef,
    pub at: i64,
}

impl Receipt {
    pub fn now(actor: ActorRef) -> Self {
        Self {
            actor,
            at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Sender {
    pub actor: ActorRef,
    /// Display name captured at send time; later renames do not rewrite history.
    pub display_name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: Id,
    pub conversation_id: conversation::Id,
    pub sender: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
    pub status: Status,
    pub read_by: Vec<Receipt>,
    pub delivered_to: Vec<Receipt>,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Id>,
    pub kind: Kind,
    pub metadata: Document,
    pub created_at: i64,
}

impl Message {
    /// A message is created with the sender's own read receipt in place.
    pub fn new(
        conversation_id: conversation::Id,
        sender: Sender,
        text: Option<String>,
        attachments: Vec<Attachment>,
        reply_to: Option<Id>,
        metadata: Document,
    ) -> super::Result<Self> {
        let has_text = text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && attachments.is_empty() {
            return Err(super::Error::EmptyMessage);
        }

        let kind = classify(text.as_deref().unwrap_or(""), &attachments);
        let sender_receipt = Receipt::now(sender.actor.clone());

        Ok(Self {
            id: Id::random(),
            conversation_id,
            sender,
            text,
            attachments,
            status: Status::Sent,
            read_by: vec![sender_receipt],
            delivered_to: vec![],
            is_edited: false,
            edited_at: None,
            reply_to,
            kind,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    pub fn is_read_by(&self, actor: &ActorRef) -> bool {
        self.read_by.iter().any(|r| r.actor.eq(actor))
    }

    pub fn last_message(&self) -> LastMessage {
        let text = match (&self.text, self.attachments.first()) {
            (Some(t), _) if !t.trim().is_empty() => t.clone(),
            (_, Some(a)) => format!("\u{1F4CE} {}", a.name),
            _ => String::new(),
        };

        LastMessage {
            text,
            sender: self.sender.actor.clone(),
            at: self.created_at,
        }
    }
}

/// Derives the message kind. Only the first attachment is examined; a mixed
/// set is classified by its first entry. That is how this has always behaved
/// and clients rely on it, so it stays.
pub fn classify(text: &str, attachments: &[Attachment]) -> Kind {
    if let Some(first) = attachments.first() {
        let mime = first.mime_type.to_lowercase();
        if mime.starts_with("image/") {
            return Kind::Image;
        }
        if mime == "application/pdf" || mime.contains("document") || mime.contains("sheet") {
            return Kind::Document;
        }
    }

    if text.len() > ANNOUNCEMENT_THRESHOLD {
        Kind::Announcement
    } else {
        Kind::Text
    }
}

/// One file in a send request, raw bytes included. Upload mechanics live
/// behind `integration::storage`.
#[derive(Clone, Deserialize)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A send addresses either an existing conversation or a fresh target;
/// exactly one of the selector groups must be present.
#[derive(Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub conversation_id: Option<conversation::Id>,
    #[serde(default, flatten)]
    pub broadcast: Option<conversation::BroadcastTarget>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub recipient: Option<ActorRef>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
    #[serde(default)]
    pub reply_to: Option<Id>,
}

impl SendRequest {
    /// Rejects before any mutation happens.
    pub fn validate(&self) -> super::Result<()> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && self.attachments.is_empty() {
            return Err(super::Error::EmptyMessage);
        }

        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(super::Error::TooManyAttachments(self.attachments.len()));
        }

        for a in &self.attachments {
            if a.data.len() > MAX_ATTACHMENT_BYTES {
                return Err(super::Error::AttachmentTooLarge(a.name.clone()));
            }
            if !ALLOWED_MIME_TYPES.contains(&a.mime_type.to_lowercase().as_str()) {
                return Err(super::Error::UnsupportedMime(a.mime_type.clone()));
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub text: String,
}

#[derive(Clone, Debug, Deserialize, Copy)]
pub struct Page {
    #[serde(default = "Page::first")]
    pub page: u64,
    #[serde(default = "Page::default_limit")]
    pub limit: i64,
}

impl Page {
    const MAX_LIMIT: i64 = 200;

    fn first() -> u64 {
        1
    }

    fn default_limit() -> i64 {
        50
    }

    /// Query input is untrusted; a limit of zero would mean "no limit" to
    /// the database, so it is clamped away together with negatives.
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit() as u64)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: Self::first(),
            limit: Self::default_limit(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageDto {
    pub id: Id,
    pub conversation_id: conversation::Id,
    pub sender: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
    pub status: Status,
    pub kind: Kind,
    pub read_by: Vec<Receipt>,
    pub delivered_to: Vec<Receipt>,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Id>,
    pub created_at: i64,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender: m.sender,
            text: m.text,
            attachments: m.attachments,
            status: m.status,
            kind: m.kind,
            read_by: m.read_by,
            delivered_to: m.delivered_to,
            is_edited: m.is_edited,
            edited_at: m.edited_at,
            reply_to: m.reply_to,
            created_at: m.created_at,
        }
    }
}

/// What the "open a conversation" endpoint returns.
#[derive(Debug, Serialize)]
pub struct ConversationPage {
    pub conversation: crate::conversation::model::ConversationDto,
    pub messages: Vec<MessageDto>,
    pub page: u64,
    pub limit: i64,
}

#[cfg(test)]
mod test {
    use crate::actor::Kind as ActorKind;

    use super::*;

    fn attachment(mime: &str) -> Attachment {
        Attachment {
            name: "file".into(),
            url: "http://files/file".into(),
            external_id: "x1".into(),
            mime_type: mime.into(),
            size_bytes: 10,
            uploaded_at: 0,
        }
    }

    fn sender() -> Sender {
        Sender {
            actor: ActorRef::new("e1", ActorKind::Employee),
            display_name: "Mr. Holt".into(),
        }
    }

    #[test]
    fn should_classify_first_image_as_image() {
        assert_eq!(classify("", &[attachment("image/png")]), Kind::Image);
    }

    #[test]
    fn should_classify_pdf_as_document() {
        assert_eq!(classify("", &[attachment("application/pdf")]), Kind::Document);
        assert_eq!(
            classify(
                "",
                &[attachment(
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                )]
            ),
            Kind::Document
        );
    }

    #[test]
    fn should_classify_long_text_as_announcement() {
        assert_eq!(classify(&"a".repeat(600), &[]), Kind::Announcement);
        assert_eq!(classify(&"a".repeat(50), &[]), Kind::Text);
    }

    #[test]
    fn should_classify_mixed_set_by_first_entry_only() {
        let mixed = vec![attachment("image/png"), attachment("application/pdf")];
        assert_eq!(classify("", &mixed), Kind::Image);

        let reversed = vec![attachment("application/zip"), attachment("image/png")];
        // first entry is neither image nor document, falls through to text rules
        assert_eq!(classify("short", &reversed), Kind::Text);
    }

    #[test]
    fn should_reject_empty_message() {
        let err = Message::new(
            conversation::Id::random(),
            sender(),
            Some("   ".into()),
            vec![],
            None,
            Document::new(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::message::Error::EmptyMessage));
    }

    #[test]
    fn should_accept_attachment_without_text() {
        let msg = Message::new(
            conversation::Id::random(),
            sender(),
            None,
            vec![attachment("image/png")],
            None,
            Document::new(),
        )
        .unwrap();

        assert_eq!(msg.kind, Kind::Image);
        assert_eq!(msg.status, Status::Sent);
    }

    #[test]
    fn should_premark_sender_as_reader() {
        let msg = Message::new(
            conversation::Id::random(),
            sender(),
            Some("hello".into()),
            vec![],
            None,
            Document::new(),
        )
        .unwrap();

        assert!(msg.is_read_by(&sender().actor));
        assert!(msg.delivered_to.is_empty());
    }

    #[test]
    fn should_validate_attachment_limits() {
        let upload = |mime: &str, size: usize| AttachmentUpload {
            name: "f".into(),
            mime_type: mime.into(),
            data: vec![0; size],
        };

        let mut req = SendRequest {
            conversation_id: None,
            broadcast: None,
            class_name: None,
            recipient: None,
            text: Some("hi".into()),
            attachments: vec![upload("image/png", 16)],
            reply_to: None,
        };
        assert!(req.validate().is_ok());

        req.attachments = vec![upload("application/x-msdownload", 16)];
        assert!(matches!(
            req.validate(),
            Err(crate::message::Error::UnsupportedMime(_))
        ));

        req.attachments = (0..6).map(|_| upload("image/png", 16)).collect();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, crate::message::Error::TooManyAttachments(6)));
        assert_eq!(err.to_string(), "too many attachments: 6, at most 5 allowed");

        req.attachments = vec![upload("image/png", MAX_ATTACHMENT_BYTES + 1)];
        assert!(matches!(
            req.validate(),
            Err(crate::message::Error::AttachmentTooLarge(_))
        ));
    }

    #[test]
    fn should_clamp_hostile_paging_input() {
        let hostile = Page {
            page: u64::MAX,
            limit: i64::MAX,
        };
        assert_eq!(hostile.limit(), Page::MAX_LIMIT);
        assert_eq!(hostile.skip(), u64::MAX);

        let negative = Page { page: 0, limit: -5 };
        assert_eq!(negative.limit(), 1);
        assert_eq!(negative.skip(), 0);
    }

    #[test]
    fn should_preview_attachment_when_text_missing() {
        let msg = Message::new(
            conversation::Id::random(),
            sender(),
            None,
            vec![attachment("image/png")],
            None,
            Document::new(),
        )
        .unwrap();

        let last = msg.last_message();
        assert!(last.text.contains("file"));
        assert_eq!(last.sender, sender().actor);
    }
}

use std::fmt::Display;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::api;

/// Separator between the kind prefix and the id in a persisted counter key.
/// The kind comes first and is drawn from a closed enum, so decoding splits
/// on the first occurrence only and ids may contain anything.
const KEY_SEPARATOR: char = ':';

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Admin,
    Student,
    Employee,
}

impl Kind {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
            Self::Employee => "employee",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "student" => Some(Self::Student),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Id(pub String);

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Id, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Id(s))
    }
}

/// Reference into one of the three disjoint actor populations.
#[derive(Clone, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
pub struct ActorRef {
    pub id: Id,
    pub kind: Kind,
}

impl ActorRef {
    pub fn new(id: impl Into<String>, kind: Kind) -> Self {
        Self {
            id: Id(id.into()),
            kind,
        }
    }

    pub fn key(&self) -> Key {
        Key(self.clone())
    }
}

impl Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.kind.as_str(), self.id)
    }
}

/// Structured key of the per-actor unread counter map. Persisted as the
/// bson map key `<kind>:<id>`; in code it stays a typed (id, kind) pair so
/// two distinct actors can never collide.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Key(pub ActorRef);

impl Key {
    pub const fn actor(&self) -> &ActorRef {
        &self.0
    }

    fn decode(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(KEY_SEPARATOR)?;
        let kind = Kind::from_str(kind)?;
        Some(Self(ActorRef::new(id, kind)))
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Key, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Key::decode(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid actor key: {s}")))
    }
}

/// The authenticated request identity, injected by the boundary as an
/// axum extension. Resolving credentials into this is not our concern.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Caller {
    pub actor: ActorRef,
    pub display_name: String,
}

impl Caller {
    pub fn new(actor: ActorRef, display_name: impl Into<String>) -> Self {
        Self {
            actor,
            display_name: display_name.into(),
        }
    }
}

/// Trusts the gateway-provided identity headers and turns them into a
/// [`Caller`] extension. Requests without a complete identity never reach
/// a handler.
pub async fn identity(mut req: Request, next: Next) -> Response {
    let id = header(&req, "x-actor-id");
    let kind = header(&req, "x-actor-kind");
    let display_name = header(&req, "x-display-name");

    let caller = id.zip(kind).and_then(|(id, kind)| {
        let kind = Kind::from_str(&kind)?;
        let display_name = display_name.unwrap_or_else(|| id.clone());
        Some(Caller::new(ActorRef::new(id, kind), display_name))
    });

    match caller {
        Some(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        None => api::failure(StatusCode::UNAUTHORIZED, "Missing or invalid identity"),
    }
}

fn header(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_encode_kind_first() {
        let key = ActorRef::new("s-42", Kind::Student).key();
        assert_eq!(key.to_string(), "student:s-42");
    }

    #[test]
    fn should_decode_what_it_encoded() {
        let actor = ActorRef::new("e-7", Kind::Employee);
        let decoded = Key::decode(&actor.key().to_string()).unwrap();
        assert_eq!(decoded.actor(), &actor);
    }

    #[test]
    fn should_survive_separator_inside_id() {
        let actor = ActorRef::new("weird:id:1", Kind::Admin);
        let decoded = Key::decode(&actor.key().to_string()).unwrap();
        assert_eq!(decoded.actor().id.0, "weird:id:1");
        assert_eq!(decoded.actor().kind, Kind::Admin);
    }

    #[test]
    fn should_not_collide_across_kinds() {
        let student = ActorRef::new("1", Kind::Student).key();
        let employee = ActorRef::new("1", Kind::Employee).key();
        assert_ne!(student.to_string(), employee.to_string());
    }

    #[test]
    fn should_reject_unknown_kind() {
        assert!(Key::decode("teacher:1").is_none());
        assert!(Key::decode("no-separator").is_none());
    }

    mod middleware {
        use axum::body::Body;
        use axum::routing::get;
        use axum::{Extension, Router, middleware};
        use tower::ServiceExt;

        use super::*;

        fn app() -> Router {
            Router::new()
                .route(
                    "/whoami",
                    get(|Extension(caller): Extension<Caller>| async move {
                        caller.actor.to_string()
                    }),
                )
                .layer(middleware::from_fn(identity))
        }

        #[tokio::test]
        async fn should_reject_requests_without_identity() {
            let res = app()
                .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn should_inject_the_caller_from_headers() {
            let res = app()
                .oneshot(
                    Request::builder()
                        .uri("/whoami")
                        .header("x-actor-id", "s-1")
                        .header("x-actor-kind", "student")
                        .header("x-display-name", "Ann")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(res.status(), StatusCode::OK);
            let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
            assert_eq!(&body[..], b"student:s-1");
        }
    }
}

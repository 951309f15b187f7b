use serde::{Deserialize, Serialize};

use crate::actor::{ActorRef, Kind};

/// What the directory resolves an (id, kind) pair into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorProfile {
    pub actor: ActorRef,
    pub display_name: String,
}

impl ActorProfile {
    pub fn new(actor: ActorRef, display_name: impl Into<String>) -> Self {
        Self {
            actor,
            display_name: display_name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub status: Status,
    pub class_name: Option<String>,
}

impl Student {
    pub fn profile(&self) -> ActorProfile {
        ActorProfile::new(ActorRef::new(&self.student_id, Kind::Student), &self.name)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    pub role: String,
    pub status: Status,
}

impl Employee {
    pub fn profile(&self) -> ActorProfile {
        ActorProfile::new(ActorRef::new(&self.employee_id, Kind::Employee), &self.name)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Admin {
    pub admin_id: String,
    pub name: String,
}

impl Admin {
    pub fn profile(&self) -> ActorProfile {
        ActorProfile::new(ActorRef::new(&self.admin_id, Kind::Admin), &self.name)
    }
}

/// A class roster entry. `owner` is the instructor the class is assigned to,
/// or the admin who created it; scoping of lookups goes through it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SchoolClass {
    pub class_id: String,
    pub name: String,
    pub owner: ActorRef,
}

#[derive(Serialize)]
pub struct RecipientDto {
    pub id: String,
    pub kind: Kind,
    pub display_name: String,
}

impl From<ActorProfile> for RecipientDto {
    fn from(p: ActorProfile) -> Self {
        Self {
            id: p.actor.id.0,
            kind: p.actor.kind,
            display_name: p.display_name,
        }
    }
}

#[derive(Serialize)]
pub struct ClassDto {
    pub class_id: String,
    pub name: String,
}

impl From<SchoolClass> for ClassDto {
    fn from(c: SchoolClass) -> Self {
        Self {
            class_id: c.class_id,
            name: c.name,
        }
    }
}

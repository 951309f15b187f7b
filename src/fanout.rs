use crate::actor::{ActorRef, Kind};
use crate::conversation::BroadcastTarget;
use crate::directory::model::{ActorProfile, SchoolClass};
use crate::{conversation, directory};

/// Expands a send target into the concrete recipient list. This is the only
/// place that decides who a message actually reaches.
#[derive(Clone)]
pub struct FanoutResolver {
    directory: directory::Directory,
    roster: directory::Roster,
}

impl FanoutResolver {
    pub fn new(directory: directory::Directory, roster: directory::Roster) -> Self {
        Self { directory, roster }
    }

    pub async fn broadcast(
        &self,
        target: &BroadcastTarget,
    ) -> directory::Result<Vec<ActorProfile>> {
        match target {
            BroadcastTarget::AllStudents => self.roster.active_students().await,
            BroadcastTarget::AllEmployees => self.roster.active_employees().await,
            BroadcastTarget::SpecificClass { class_id } => {
                let class = self.class_by_id(class_id).await?;
                self.class(&class).await
            }
            BroadcastTarget::SpecificStudent { student_id } => {
                let profile = self
                    .individual(&ActorRef::new(student_id, Kind::Student))
                    .await?;
                Ok(vec![profile])
            }
            BroadcastTarget::SpecificEmployee { employee_id } => {
                let profile = self
                    .individual(&ActorRef::new(employee_id, Kind::Employee))
                    .await?;
                Ok(vec![profile])
            }
        }
    }

    /// Active students of the class. The class itself must already be
    /// resolved within the creator's scope.
    pub async fn class(&self, class: &SchoolClass) -> directory::Result<Vec<ActorProfile>> {
        self.roster.students_in_class(class).await
    }

    /// Case-insensitive class-name match scoped to the creator's classes.
    pub async fn class_by_name(
        &self,
        creator: &ActorRef,
        name: &str,
    ) -> directory::Result<SchoolClass> {
        self.roster
            .class_by_name(creator, name)
            .await?
            .ok_or_else(|| directory::Error::ClassNotFound(name.to_string()))
    }

    pub async fn class_by_id(&self, class_id: &str) -> directory::Result<SchoolClass> {
        self.roster
            .class_by_id(class_id)
            .await?
            .ok_or_else(|| directory::Error::ClassNotFound(class_id.to_string()))
    }

    pub async fn individual(&self, actor: &ActorRef) -> directory::Result<ActorProfile> {
        self.directory.resolve(actor).await
    }

    /// Notify-the-room semantics for sends into an existing conversation:
    /// everyone currently in it, minus the sender. Membership scope is not
    /// re-resolved.
    pub fn participants(
        conversation: &conversation::model::Conversation,
        sender: &ActorRef,
    ) -> Vec<ActorRef> {
        conversation.other_participants(sender)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::actor::Kind as ActorKind;
    use crate::directory::repository::{ActorDirectory, RosterSource};

    use super::*;

    /// Small fixed school: one class, four students, two employees.
    pub struct FakeSchool;

    fn student(id: &str, name: &str) -> ActorProfile {
        ActorProfile::new(ActorRef::new(id, ActorKind::Student), name)
    }

    fn employee(id: &str, name: &str) -> ActorProfile {
        ActorProfile::new(ActorRef::new(id, ActorKind::Employee), name)
    }

    fn math_class() -> SchoolClass {
        SchoolClass {
            class_id: "c-math".into(),
            name: "Math 7A".into(),
            owner: ActorRef::new("e1", ActorKind::Employee),
        }
    }

    #[async_trait]
    impl ActorDirectory for FakeSchool {
        async fn resolve(&self, actor: &ActorRef) -> directory::Result<ActorProfile> {
            match (actor.id.0.as_str(), actor.kind) {
                ("s1", ActorKind::Student) => Ok(student("s1", "Ann")),
                ("s2", ActorKind::Student) => Ok(student("s2", "Bob")),
                ("e1", ActorKind::Employee) => Ok(employee("e1", "Mr. Holt")),
                _ => Err(directory::Error::ActorNotFound(actor.clone())),
            }
        }
    }

    #[async_trait]
    impl RosterSource for FakeSchool {
        async fn active_students(&self) -> directory::Result<Vec<ActorProfile>> {
            Ok(vec![
                student("s1", "Ann"),
                student("s2", "Bob"),
                student("s3", "Cid"),
                student("s4", "Dee"),
            ])
        }

        async fn active_employees(&self) -> directory::Result<Vec<ActorProfile>> {
            Ok(vec![employee("e1", "Mr. Holt"), employee("e2", "Ms. Diaz")])
        }

        async fn students_in_class(
            &self,
            class: &SchoolClass,
        ) -> directory::Result<Vec<ActorProfile>> {
            match class.class_id.as_str() {
                "c-math" => Ok(vec![student("s1", "Ann"), student("s2", "Bob")]),
                _ => Ok(vec![]),
            }
        }

        async fn class_by_name(
            &self,
            owner: &ActorRef,
            name: &str,
        ) -> directory::Result<Option<SchoolClass>> {
            let class = math_class();
            let matches = class.owner.eq(owner) && class.name.eq_ignore_ascii_case(name);
            Ok(matches.then_some(class))
        }

        async fn class_by_id(&self, class_id: &str) -> directory::Result<Option<SchoolClass>> {
            Ok((class_id == "c-math").then(math_class))
        }

        async fn classes_for(
            &self,
            owner: &ActorRef,
            _cap: usize,
        ) -> directory::Result<Vec<SchoolClass>> {
            let class = math_class();
            Ok(if class.owner.eq(owner) { vec![class] } else { vec![] })
        }

        async fn search_recipients(
            &self,
            kind: ActorKind,
            _query: Option<&str>,
            cap: usize,
        ) -> directory::Result<Vec<ActorProfile>> {
            let mut all = match kind {
                ActorKind::Student => self.active_students().await?,
                ActorKind::Employee => self.active_employees().await?,
                ActorKind::Admin => vec![],
            };
            all.truncate(cap);
            Ok(all)
        }
    }

    pub fn resolver() -> FanoutResolver {
        FanoutResolver::new(Arc::new(FakeSchool), Arc::new(FakeSchool))
    }

    #[tokio::test]
    async fn should_fan_out_to_all_active_students() {
        let recipients = resolver()
            .broadcast(&BroadcastTarget::AllStudents)
            .await
            .unwrap();
        assert_eq!(recipients.len(), 4);
    }

    #[tokio::test]
    async fn should_fan_out_class_broadcast_through_its_roster() {
        let recipients = resolver()
            .broadcast(&BroadcastTarget::SpecificClass {
                class_id: "c-math".into(),
            })
            .await
            .unwrap();
        assert_eq!(recipients.len(), 2);
    }

    #[tokio::test]
    async fn should_match_class_name_case_insensitively_within_scope() {
        let owner = ActorRef::new("e1", ActorKind::Employee);
        let class = resolver().class_by_name(&owner, "math 7a").await.unwrap();
        assert_eq!(class.class_id, "c-math");

        let stranger = ActorRef::new("e2", ActorKind::Employee);
        let err = resolver().class_by_name(&stranger, "math 7a").await;
        assert!(matches!(err, Err(directory::Error::ClassNotFound(_))));
    }

    #[tokio::test]
    async fn should_fail_fanout_for_unknown_recipient() {
        let missing = ActorRef::new("s999", ActorKind::Student);
        let err = resolver().individual(&missing).await;
        assert!(matches!(err, Err(directory::Error::ActorNotFound(_))));
    }

    #[tokio::test]
    async fn should_target_participants_minus_sender() {
        use crate::conversation::model::Conversation;

        let sender = ActorRef::new("e1", ActorKind::Employee);
        let mut conv = Conversation::broadcast(
            BroadcastTarget::AllStudents,
            sender.clone(),
            "All Students".into(),
        );
        conv.ensure_present(&ActorRef::new("s1", ActorKind::Student));
        conv.ensure_present(&ActorRef::new("s2", ActorKind::Student));

        let recipients = FanoutResolver::participants(&conv, &sender);
        assert_eq!(recipients.len(), 2);
        assert!(recipients.iter().all(|r| r.ne(&sender)));
    }
}

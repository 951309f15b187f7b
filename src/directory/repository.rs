use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};

use crate::actor::{ActorRef, Kind};

use super::model::{ActorProfile, Admin, Employee, SchoolClass, Student};

const STUDENTS_COLLECTION: &str = "students";
const EMPLOYEES_COLLECTION: &str = "employees";
const ADMINS_COLLECTION: &str = "admins";
const CLASSES_COLLECTION: &str = "classes";

/// Resolves an actor reference into a profile, whichever population it
/// belongs to.
#[async_trait]
pub trait ActorDirectory {
    async fn resolve(&self, actor: &ActorRef) -> super::Result<ActorProfile>;
}

#[async_trait]
pub trait RosterSource {
    async fn active_students(&self) -> super::Result<Vec<ActorProfile>>;

    async fn active_employees(&self) -> super::Result<Vec<ActorProfile>>;

    async fn students_in_class(&self, class: &SchoolClass) -> super::Result<Vec<ActorProfile>>;

    /// Case-insensitive name match, scoped to the owner's classes.
    async fn class_by_name(&self, owner: &ActorRef, name: &str)
    -> super::Result<Option<SchoolClass>>;

    async fn class_by_id(&self, class_id: &str) -> super::Result<Option<SchoolClass>>;

    async fn classes_for(&self, owner: &ActorRef, cap: usize) -> super::Result<Vec<SchoolClass>>;

    async fn search_recipients(
        &self,
        kind: Kind,
        query: Option<&str>,
        cap: usize,
    ) -> super::Result<Vec<ActorProfile>>;
}

pub struct MongoDirectory {
    students: mongodb::Collection<Student>,
    employees: mongodb::Collection<Employee>,
    admins: mongodb::Collection<Admin>,
    classes: mongodb::Collection<SchoolClass>,
}

impl MongoDirectory {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            students: db.collection(STUDENTS_COLLECTION),
            employees: db.collection(EMPLOYEES_COLLECTION),
            admins: db.collection(ADMINS_COLLECTION),
            classes: db.collection(CLASSES_COLLECTION),
        }
    }

    fn search_filter(fields: &[&str], query: Option<&str>) -> Document {
        match query {
            Some(q) if !q.is_empty() => {
                let ors: Vec<Document> = fields
                    .iter()
                    .map(|f| doc! { *f: { "$regex": q, "$options": "i" } })
                    .collect();
                doc! { "$or": ors }
            }
            _ => doc! {},
        }
    }
}

#[async_trait]
impl ActorDirectory for MongoDirectory {
    async fn resolve(&self, actor: &ActorRef) -> super::Result<ActorProfile> {
        let profile = match actor.kind {
            Kind::Student => self
                .students
                .find_one(doc! { "student_id": &actor.id.0 })
                .await?
                .map(|s| s.profile()),
            Kind::Employee => self
                .employees
                .find_one(doc! { "employee_id": &actor.id.0 })
                .await?
                .map(|e| e.profile()),
            Kind::Admin => self
                .admins
                .find_one(doc! { "admin_id": &actor.id.0 })
                .await?
                .map(|a| a.profile()),
        };

        profile.ok_or(super::Error::ActorNotFound(actor.clone()))
    }
}

#[async_trait]
impl RosterSource for MongoDirectory {
    async fn active_students(&self) -> super::Result<Vec<ActorProfile>> {
        let cursor = self.students.find(doc! { "status": "active" }).await?;
        let students: Vec<Student> = cursor.try_collect().await?;

        Ok(students.iter().map(Student::profile).collect())
    }

    async fn active_employees(&self) -> super::Result<Vec<ActorProfile>> {
        let cursor = self.employees.find(doc! { "status": "active" }).await?;
        let employees: Vec<Employee> = cursor.try_collect().await?;

        Ok(employees.iter().map(Employee::profile).collect())
    }

    async fn students_in_class(&self, class: &SchoolClass) -> super::Result<Vec<ActorProfile>> {
        let cursor = self
            .students
            .find(doc! {
                "status": "active",
                "class_name": { "$regex": format!("^{}$", class.name), "$options": "i" },
            })
            .await?;
        let students: Vec<Student> = cursor.try_collect().await?;

        Ok(students.iter().map(Student::profile).collect())
    }

    async fn class_by_name(
        &self,
        owner: &ActorRef,
        name: &str,
    ) -> super::Result<Option<SchoolClass>> {
        let class = self
            .classes
            .find_one(doc! {
                "owner.id": &owner.id.0,
                "owner.kind": owner.kind,
                "name": { "$regex": format!("^{name}$"), "$options": "i" },
            })
            .await?;

        Ok(class)
    }

    async fn class_by_id(&self, class_id: &str) -> super::Result<Option<SchoolClass>> {
        let class = self.classes.find_one(doc! { "class_id": class_id }).await?;
        Ok(class)
    }

    async fn classes_for(&self, owner: &ActorRef, cap: usize) -> super::Result<Vec<SchoolClass>> {
        let cursor = self
            .classes
            .find(doc! {
                "owner.id": &owner.id.0,
                "owner.kind": owner.kind,
            })
            .sort(doc! { "name": 1 })
            .limit(cap as i64)
            .await?;

        let classes: Vec<SchoolClass> = cursor.try_collect().await?;
        Ok(classes)
    }

    async fn search_recipients(
        &self,
        kind: Kind,
        query: Option<&str>,
        cap: usize,
    ) -> super::Result<Vec<ActorProfile>> {
        match kind {
            Kind::Student => {
                let filter = Self::search_filter(&["student_id", "name"], query);
                let cursor = self.students.find(filter).limit(cap as i64).await?;
                let students: Vec<Student> = cursor.try_collect().await?;
                Ok(students.iter().map(Student::profile).collect())
            }
            Kind::Employee => {
                let filter = Self::search_filter(&["employee_id", "name", "role"], query);
                let cursor = self.employees.find(filter).limit(cap as i64).await?;
                let employees: Vec<Employee> = cursor.try_collect().await?;
                Ok(employees.iter().map(Employee::profile).collect())
            }
            Kind::Admin => Ok(vec![]),
        }
    }
}

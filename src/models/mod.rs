use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{LmsError, LmsResult};

// ============================================================================
// Form plumbing shared by every record shape
// ============================================================================

/// Field values as entered, keyed by field name, in form order.
pub type FormValues = IndexMap<&'static str, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    /// Masked on screen, never read back from a stored record.
    Password,
    /// Kept as text while editing, parsed when the record is built.
    Number,
    /// A local file path before upload, a reference once persisted.
    Attachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Required {
    Always,
    /// Required when adding; blank on edit means "keep what is stored".
    OnCreate,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: Required,
}

impl Field {
    pub const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: Required::Always,
        }
    }

    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub const fn with_required(mut self, required: Required) -> Self {
        self.required = required;
        self
    }

    pub fn is_required(&self, editing: bool) -> bool {
        match self.required {
            Required::Always => true,
            Required::OnCreate => !editing,
            Required::Optional => false,
        }
    }
}

/// Values the form cannot supply itself.
#[derive(Debug, Clone)]
pub struct FormContext {
    /// Uid of the signed-in principal, stamped on owned records.
    pub owner_id: String,
    pub now: DateTime<Utc>,
}

impl FormContext {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            now: Utc::now(),
        }
    }
}

/// A flat document shape stored in one named collection.
pub trait Record:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const COLLECTION: &'static str;
    const LABEL: &'static str;
    /// Append-only collections have no edit or delete path.
    const EDITABLE: bool = false;
    const FIELDS: &'static [Field];
    const COLUMNS: &'static [&'static str];

    /// Copy this record into form values. Credentials are never copied.
    fn to_values(&self) -> FormValues;

    /// Build a record from validated form values. `previous` is the record
    /// being edited, if any.
    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        ctx: &FormContext,
    ) -> LmsResult<Self>;

    /// Table cells, one per entry of `COLUMNS`.
    fn cells(&self) -> Vec<String>;

    fn attachments_mut(&mut self) -> Vec<&mut String> {
        Vec::new()
    }

}

/// A record together with the identity the remote store gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub record: T,
}

fn value(values: &FormValues, name: &str) -> String {
    values.get(name).cloned().unwrap_or_default()
}

fn parse_whole_number(label: &str, raw: &str) -> LmsResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| LmsError::InvalidNumericInput {
            field: label.to_string(),
            value: raw.to_string(),
        })
}

/// Salted SHA-256, stored as `salt$hexdigest`.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn password_hash(values: &FormValues, previous: Option<&str>) -> String {
    // Whitespace-only counts as blank, as in form validation.
    let password = value(values, "password");
    if password.trim().is_empty() {
        previous.unwrap_or_default().to_string()
    } else {
        hash_password(&password)
    }
}

fn short_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Collections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub name: String,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub batch: String,
    pub department: String,
    pub semester: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
}

impl Record for Student {
    const COLLECTION: &'static str = "students";
    const LABEL: &'static str = "Student";
    const EDITABLE: bool = true;
    const FIELDS: &'static [Field] = &[
        Field::text("name", "Student Name"),
        Field::text("studentID", "Student ID"),
        Field::text("batch", "Batch"),
        Field::text("department", "Department"),
        Field::text("semester", "Semester"),
        Field::new("email", "Email", FieldKind::Email),
        Field::new("password", "Password", FieldKind::Password).with_required(Required::OnCreate),
    ];
    const COLUMNS: &'static [&'static str] =
        &["Name", "Student ID", "Batch", "Department", "Semester", "Email"];

    fn to_values(&self) -> FormValues {
        let mut values = FormValues::new();
        values.insert("name", self.name.clone());
        values.insert("studentID", self.student_id.clone());
        values.insert("batch", self.batch.clone());
        values.insert("department", self.department.clone());
        values.insert("semester", self.semester.clone());
        values.insert("email", self.email.clone());
        values.insert("password", String::new());
        values
    }

    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        _ctx: &FormContext,
    ) -> LmsResult<Self> {
        Ok(Student {
            name: value(values, "name"),
            student_id: value(values, "studentID"),
            batch: value(values, "batch"),
            department: value(values, "department"),
            semester: value(values, "semester"),
            email: value(values, "email"),
            password_hash: password_hash(values, previous.map(|p| p.password_hash.as_str())),
        })
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.student_id.clone(),
            self.batch.clone(),
            self.department.clone(),
            self.semester.clone(),
            self.email.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub name: String,
    pub subject: String,
    pub department: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
}

impl Record for Teacher {
    const COLLECTION: &'static str = "teachers";
    const LABEL: &'static str = "Teacher";
    const EDITABLE: bool = true;
    const FIELDS: &'static [Field] = &[
        Field::text("name", "Teacher Name"),
        Field::text("subject", "Subject"),
        Field::text("department", "Department"),
        Field::new("email", "Email", FieldKind::Email),
        Field::new("password", "Password", FieldKind::Password).with_required(Required::OnCreate),
    ];
    const COLUMNS: &'static [&'static str] = &["Name", "Subject", "Department", "Email"];

    fn to_values(&self) -> FormValues {
        let mut values = FormValues::new();
        values.insert("name", self.name.clone());
        values.insert("subject", self.subject.clone());
        values.insert("department", self.department.clone());
        values.insert("email", self.email.clone());
        values.insert("password", String::new());
        values
    }

    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        _ctx: &FormContext,
    ) -> LmsResult<Self> {
        Ok(Teacher {
            name: value(values, "name"),
            subject: value(values, "subject"),
            department: value(values, "department"),
            email: value(values, "email"),
            password_hash: password_hash(values, previous.map(|p| p.password_hash.as_str())),
        })
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.subject.clone(),
            self.department.clone(),
            self.email.clone(),
        ]
    }
}

/// Teacher-authored coursework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub title: String,
    pub description: String,
    pub file_reference: String,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
}

impl Record for Assignment {
    const COLLECTION: &'static str = "assignments";
    const LABEL: &'static str = "Assignment";
    const FIELDS: &'static [Field] = &[
        Field::text("title", "Title"),
        Field::text("description", "Description"),
        Field::new("fileReference", "File", FieldKind::Attachment),
    ];
    const COLUMNS: &'static [&'static str] = &["Title", "Description", "File", "Created"];

    fn to_values(&self) -> FormValues {
        let mut values = FormValues::new();
        values.insert("title", self.title.clone());
        values.insert("description", self.description.clone());
        values.insert("fileReference", self.file_reference.clone());
        values
    }

    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        ctx: &FormContext,
    ) -> LmsResult<Self> {
        Ok(Assignment {
            title: value(values, "title"),
            description: value(values, "description"),
            file_reference: value(values, "fileReference"),
            created_at: previous.map(|p| p.created_at).unwrap_or(ctx.now),
            owner_id: previous
                .map(|p| p.owner_id.clone())
                .unwrap_or_else(|| ctx.owner_id.clone()),
        })
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.description.clone(),
            self.file_reference.clone(),
            short_time(&self.created_at),
        ]
    }

    fn attachments_mut(&mut self) -> Vec<&mut String> {
        vec![&mut self.file_reference]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub student_name: String,
    pub student_id: String,
    pub department: String,
    pub batch: String,
    pub semester: String,
    pub marks: i64,
    #[serde(default)]
    pub result_file_reference: String,
    pub owner_id: String,
}

impl Record for ResultRecord {
    const COLLECTION: &'static str = "results";
    const LABEL: &'static str = "Result";
    const FIELDS: &'static [Field] = &[
        Field::text("studentName", "Student Name"),
        Field::text("studentId", "Student ID"),
        Field::text("department", "Department"),
        Field::text("batch", "Batch"),
        Field::text("semester", "Semester"),
        Field::new("marks", "Marks", FieldKind::Number),
        Field::new("resultFileReference", "Result File", FieldKind::Attachment)
            .with_required(Required::Optional),
    ];
    const COLUMNS: &'static [&'static str] = &[
        "Student", "Student ID", "Department", "Batch", "Semester", "Marks", "File",
    ];

    fn to_values(&self) -> FormValues {
        let mut values = FormValues::new();
        values.insert("studentName", self.student_name.clone());
        values.insert("studentId", self.student_id.clone());
        values.insert("department", self.department.clone());
        values.insert("batch", self.batch.clone());
        values.insert("semester", self.semester.clone());
        values.insert("marks", self.marks.to_string());
        values.insert("resultFileReference", self.result_file_reference.clone());
        values
    }

    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        ctx: &FormContext,
    ) -> LmsResult<Self> {
        let marks = parse_whole_number("Marks", &value(values, "marks"))?;
        Ok(ResultRecord {
            student_name: value(values, "studentName"),
            student_id: value(values, "studentId"),
            department: value(values, "department"),
            batch: value(values, "batch"),
            semester: value(values, "semester"),
            marks,
            result_file_reference: value(values, "resultFileReference"),
            owner_id: previous
                .map(|p| p.owner_id.clone())
                .unwrap_or_else(|| ctx.owner_id.clone()),
        })
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.student_name.clone(),
            self.student_id.clone(),
            self.department.clone(),
            self.batch.clone(),
            self.semester.clone(),
            self.marks.to_string(),
            self.result_file_reference.clone(),
        ]
    }

    fn attachments_mut(&mut self) -> Vec<&mut String> {
        vec![&mut self.result_file_reference]
    }
}

/// Student-authored hand-in for an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub student_name: String,
    pub student_id: String,
    pub department: String,
    pub semester: String,
    pub file_reference: String,
    pub submitted_at: DateTime<Utc>,
    pub owner_id: String,
}

impl Record for Submission {
    const COLLECTION: &'static str = "submittedAssignments";
    const LABEL: &'static str = "Submission";
    const FIELDS: &'static [Field] = &[
        Field::text("studentName", "Student Name"),
        Field::text("studentId", "Student ID"),
        Field::text("department", "Department"),
        Field::text("semester", "Semester"),
        Field::new("fileReference", "File", FieldKind::Attachment),
    ];
    const COLUMNS: &'static [&'static str] = &[
        "Student", "Student ID", "Department", "Semester", "File", "Submitted",
    ];

    fn to_values(&self) -> FormValues {
        let mut values = FormValues::new();
        values.insert("studentName", self.student_name.clone());
        values.insert("studentId", self.student_id.clone());
        values.insert("department", self.department.clone());
        values.insert("semester", self.semester.clone());
        values.insert("fileReference", self.file_reference.clone());
        values
    }

    fn from_values(
        values: &FormValues,
        previous: Option<&Self>,
        ctx: &FormContext,
    ) -> LmsResult<Self> {
        Ok(Submission {
            student_name: value(values, "studentName"),
            student_id: value(values, "studentId"),
            department: value(values, "department"),
            semester: value(values, "semester"),
            file_reference: value(values, "fileReference"),
            submitted_at: previous.map(|p| p.submitted_at).unwrap_or(ctx.now),
            owner_id: previous
                .map(|p| p.owner_id.clone())
                .unwrap_or_else(|| ctx.owner_id.clone()),
        })
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.student_name.clone(),
            self.student_id.clone(),
            self.department.clone(),
            self.semester.clone(),
            self.file_reference.clone(),
            short_time(&self.submitted_at),
        ]
    }

    fn attachments_mut(&mut self) -> Vec<&mut String> {
        vec![&mut self.file_reference]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<T: Record>(name: &str) -> Option<&'static Field> {
        T::FIELDS.iter().find(|f| f.name == name)
    }

    fn matches_password(stored: &str, candidate: &str) -> bool {
        match stored.split_once('$') {
            Some((salt, hash)) => digest(salt, candidate) == hash,
            None => false,
        }
    }

    fn student_values() -> FormValues {
        let mut values = FormValues::new();
        values.insert("name", "Asha".to_string());
        values.insert("studentID", "S1".to_string());
        values.insert("batch", "2025".to_string());
        values.insert("department", "CS".to_string());
        values.insert("semester", "3".to_string());
        values.insert("email", "a@x.com".to_string());
        values.insert("password", "p".to_string());
        values
    }

    #[test]
    fn test_student_password_is_hashed_and_never_shown() {
        let ctx = FormContext::new("admin");
        let student = Student::from_values(&student_values(), None, &ctx).unwrap();

        assert_ne!(student.password_hash, "p");
        assert!(matches_password(&student.password_hash, "p"));
        assert!(!matches_password(&student.password_hash, "q"));
        assert_eq!(student.cells().len(), Student::COLUMNS.len());
        assert!(!student.cells().iter().any(|c| c.contains(&student.password_hash)));
        assert_eq!(student.to_values()["password"], "");
    }

    #[test]
    fn test_blank_password_on_edit_keeps_stored_hash() {
        let ctx = FormContext::new("admin");
        let original = Student::from_values(&student_values(), None, &ctx).unwrap();

        let rebuilt = Student::from_values(&original.to_values(), Some(&original), &ctx).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_whitespace_password_on_edit_keeps_stored_hash() {
        let ctx = FormContext::new("admin");
        let original = Student::from_values(&student_values(), None, &ctx).unwrap();

        let mut values = original.to_values();
        values.insert("password", "  ".to_string());
        let rebuilt = Student::from_values(&values, Some(&original), &ctx).unwrap();
        assert_eq!(rebuilt.password_hash, original.password_hash);
        assert!(matches_password(&rebuilt.password_hash, "p"));

        values.insert("password", "new".to_string());
        let changed = Student::from_values(&values, Some(&original), &ctx).unwrap();
        assert!(matches_password(&changed.password_hash, "new"));
    }

    #[test]
    fn test_student_serializes_with_collection_field_names() {
        let ctx = FormContext::new("admin");
        let student = Student::from_values(&student_values(), None, &ctx).unwrap();
        let json = serde_json::to_value(&student).unwrap();

        assert_eq!(json["studentID"], "S1");
        assert!(json.get("passwordHash").is_some());
        assert!(json.get("password").is_none());
    }

    #[test]
    fn test_result_marks_are_parsed_at_build_time() {
        let ctx = FormContext::new("teacher-uid");
        let mut values = FormValues::new();
        for field in ResultRecord::FIELDS {
            values.insert(field.name, "x".to_string());
        }

        values.insert("marks", " 87 ".to_string());
        let result = ResultRecord::from_values(&values, None, &ctx).unwrap();
        assert_eq!(result.marks, 87);
        assert_eq!(result.owner_id, "teacher-uid");

        values.insert("marks", "abc".to_string());
        let err = ResultRecord::from_values(&values, None, &ctx).unwrap_err();
        assert_eq!(
            err,
            LmsError::InvalidNumericInput {
                field: "Marks".into(),
                value: "abc".into()
            }
        );
    }

    #[test]
    fn test_required_rules() {
        let password = field::<Student>("password").unwrap();
        assert!(password.is_required(false));
        assert!(!password.is_required(true));

        let file = field::<ResultRecord>("resultFileReference").unwrap();
        assert!(!file.is_required(false));
        assert!(field::<Student>("nope").is_none());
    }
}

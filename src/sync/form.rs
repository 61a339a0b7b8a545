use crate::error::{LmsError, LmsResult};
use crate::models::{Field, FormContext, FormValues, Record, Stored};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    /// Add mode.
    Empty,
    Editing { id: String },
}

/// Field values and add-versus-edit mode for one record type.
#[derive(Debug, Clone)]
pub struct EntityForm<T: Record> {
    values: FormValues,
    target: Option<Stored<T>>,
    focus: usize,
    /// Bumped by every change to values or mode.
    revision: u64,
}

impl<T: Record> Default for EntityForm<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> EntityForm<T> {
    pub fn new() -> Self {
        Self {
            values: Self::blank(),
            target: None,
            focus: 0,
            revision: 0,
        }
    }

    fn blank() -> FormValues {
        T::FIELDS
            .iter()
            .map(|field| (field.name, String::new()))
            .collect()
    }

    pub fn state(&self) -> FormState {
        match &self.target {
            Some(stored) => FormState::Editing {
                id: stored.id.clone(),
            },
            None => FormState::Empty,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.target.is_some()
    }

    /// Changes whenever the form is edited, loaded or reset. Lets a save that
    /// finishes late tell whether the form still holds what it submitted.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn edit_target(&self) -> Option<&str> {
        self.target.as_ref().map(|stored| stored.id.as_str())
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Copy every field of `stored` into the form and remember its id.
    pub fn load_for_edit(&mut self, stored: &Stored<T>) {
        let mut values = Self::blank();
        for (name, value) in stored.record.to_values() {
            if let Some(slot) = values.get_mut(name) {
                *slot = value;
            }
        }
        self.values = values;
        self.target = Some(stored.clone());
        self.focus = 0;
        self.revision += 1;
    }

    /// Returns false for a name the record type does not have.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Check required fields, then build the record that would be persisted.
    /// Leaves the form untouched either way.
    pub fn validate(&self, ctx: &FormContext) -> LmsResult<T> {
        let editing = self.is_editing();
        if let Some(field) = T::FIELDS
            .iter()
            .find(|field| field.is_required(editing) && self.value(field.name).trim().is_empty())
        {
            return Err(LmsError::missing(field.label));
        }

        T::from_values(&self.values, self.target.as_ref().map(|s| &s.record), ctx)
    }

    /// Back to an empty add form.
    pub fn reset(&mut self) {
        self.values = Self::blank();
        self.target = None;
        self.focus = 0;
        self.revision += 1;
    }

    /// Drop in-progress edits without persisting anything.
    pub fn cancel(&mut self) {
        self.reset();
    }

    // ------------------------------------------------------------------------
    // Keyboard editing
    // ------------------------------------------------------------------------

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused_field(&self) -> &'static Field {
        &T::FIELDS[self.focus.min(T::FIELDS.len() - 1)]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % T::FIELDS.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + T::FIELDS.len() - 1) % T::FIELDS.len();
    }

    pub fn push_char(&mut self, c: char) {
        let name = self.focused_field().name;
        let mut value = self.value(name).to_string();
        value.push(c);
        self.set_field(name, value);
    }

    pub fn pop_char(&mut self) {
        let name = self.focused_field().name;
        let mut value = self.value(name).to_string();
        if value.pop().is_some() {
            self.set_field(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResultRecord, Student};
    use chrono::Utc;

    fn filled_student_form() -> EntityForm<Student> {
        let mut form = EntityForm::<Student>::new();
        form.set_field("name", "Asha");
        form.set_field("studentID", "S1");
        form.set_field("batch", "2025");
        form.set_field("department", "CS");
        form.set_field("semester", "3");
        form.set_field("email", "a@x.com");
        form.set_field("password", "p");
        form
    }

    #[test]
    fn test_missing_field_reported_by_label() {
        let ctx = FormContext::new("admin");
        let mut form = filled_student_form();
        form.set_field("batch", "   ");

        let err = form.validate(&ctx).unwrap_err();
        assert_eq!(err, LmsError::missing("Batch"));
        assert_eq!(form.value("batch"), "   ");
        assert_eq!(form.state(), FormState::Empty);
    }

    #[test]
    fn test_load_for_edit_enters_editing_without_password() {
        let ctx = FormContext::new("admin");
        let record = filled_student_form().validate(&ctx).unwrap();
        let stored = Stored {
            id: "doc-1".to_string(),
            created_at: Utc::now(),
            record: record.clone(),
        };

        let mut form = EntityForm::<Student>::new();
        form.load_for_edit(&stored);
        assert_eq!(
            form.state(),
            FormState::Editing {
                id: "doc-1".to_string()
            }
        );
        assert_eq!(form.value("name"), "Asha");
        assert_eq!(form.value("password"), "");

        // Password may stay blank while editing.
        assert_eq!(form.validate(&ctx).unwrap(), record);

        form.cancel();
        assert_eq!(form.state(), FormState::Empty);
        assert_eq!(form.value("name"), "");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut form = EntityForm::<Student>::new();
        assert!(!form.set_field("nickname", "Ash"));
        assert_eq!(form.value("nickname"), "");
        assert_eq!(form.revision(), 0);
    }

    #[test]
    fn test_revision_tracks_every_change() {
        let ctx = FormContext::new("admin");
        let mut form = filled_student_form();
        let filled = form.revision();
        assert_eq!(filled, 7);

        form.validate(&ctx).unwrap();
        form.focus_next();
        assert_eq!(form.revision(), filled);

        form.push_char('x');
        assert_eq!(form.revision(), filled + 1);
        form.pop_char();
        assert_eq!(form.revision(), filled + 2);

        let stored = Stored {
            id: "doc-1".to_string(),
            created_at: Utc::now(),
            record: form.validate(&ctx).unwrap(),
        };
        form.load_for_edit(&stored);
        assert_eq!(form.revision(), filled + 3);
        form.reset();
        assert_eq!(form.revision(), filled + 4);

        // nothing to delete on an empty field
        form.pop_char();
        assert_eq!(form.revision(), filled + 4);
    }

    #[test]
    fn test_numeric_input_stays_text_until_validation() {
        let ctx = FormContext::new("teacher");
        let mut form = EntityForm::<ResultRecord>::new();
        for field in ResultRecord::FIELDS {
            form.set_field(field.name, "x");
        }
        form.set_field("marks", "abc");
        assert_eq!(form.value("marks"), "abc");

        let err = form.validate(&ctx).unwrap_err();
        assert!(matches!(err, LmsError::InvalidNumericInput { .. }));
    }

    #[test]
    fn test_keyboard_editing_follows_focus() {
        let mut form = EntityForm::<Student>::new();
        form.push_char('A');
        form.focus_next();
        form.push_char('S');
        form.push_char('1');
        form.pop_char();
        form.focus_prev();
        form.focus_prev();

        assert_eq!(form.value("name"), "A");
        assert_eq!(form.value("studentID"), "S");
        assert_eq!(form.focused_field().name, "password");
    }
}

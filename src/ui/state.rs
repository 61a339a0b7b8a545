use crate::api::{Collection, Session};
use crate::config::SyncMode;
use crate::models::{
    Assignment, FieldKind, Record, ResultRecord, Role, Student, Submission, Teacher,
};
use crate::sync::{FormState, Notifier, Screen};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginField {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    Students,
    Teachers,
    Assignments,
    Results,
    Submissions,
}

impl ScreenKind {
    pub fn title(self) -> &'static str {
        match self {
            ScreenKind::Students => "Manage Students",
            ScreenKind::Teachers => "Manage Teachers",
            ScreenKind::Assignments => "Assignments",
            ScreenKind::Results => "Results",
            ScreenKind::Submissions => "Submit Assignment",
        }
    }

    /// The dashboard tabs each role gets, in order.
    pub fn for_role(role: Role) -> &'static [ScreenKind] {
        match role {
            Role::Admin => &[ScreenKind::Students, ScreenKind::Teachers],
            Role::Teacher => &[ScreenKind::Assignments, ScreenKind::Results],
            Role::Student => &[ScreenKind::Submissions],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Form,
    Table,
}

/// The mounted management screen. Only one exists at a time.
pub enum ActiveScreen {
    Students(Screen<Student>),
    Teachers(Screen<Teacher>),
    Assignments(Screen<Assignment>),
    Results(Screen<ResultRecord>),
    Submissions(Screen<Submission>),
}

/// Run `$body` with `$screen` bound to the typed screen inside `$active`.
macro_rules! with_screen {
    ($active:expr, $screen:ident => $body:expr) => {
        match $active {
            $crate::ui::state::ActiveScreen::Students($screen) => $body,
            $crate::ui::state::ActiveScreen::Teachers($screen) => $body,
            $crate::ui::state::ActiveScreen::Assignments($screen) => $body,
            $crate::ui::state::ActiveScreen::Results($screen) => $body,
            $crate::ui::state::ActiveScreen::Submissions($screen) => $body,
        }
    };
}
pub(crate) use with_screen;

fn build<T: Record>(session: &Session, mode: SyncMode, notices: &Notifier) -> Screen<T> {
    Screen::new(
        Collection::new(session.store.clone()),
        mode,
        notices.clone(),
        session.principal.uid.clone(),
    )
    .with_blobs(session.blobs.clone())
}

impl ActiveScreen {
    /// Build an unmounted screen of `kind`.
    pub fn open(kind: ScreenKind, session: &Session, mode: SyncMode, notices: &Notifier) -> Self {
        match kind {
            ScreenKind::Students => ActiveScreen::Students(build(session, mode, notices)),
            ScreenKind::Teachers => ActiveScreen::Teachers(build(session, mode, notices)),
            ScreenKind::Assignments => ActiveScreen::Assignments(build(session, mode, notices)),
            ScreenKind::Results => ActiveScreen::Results(build(session, mode, notices)),
            ScreenKind::Submissions => ActiveScreen::Submissions(build(session, mode, notices)),
        }
    }

    pub fn kind(&self) -> ScreenKind {
        match self {
            ActiveScreen::Students(_) => ScreenKind::Students,
            ActiveScreen::Teachers(_) => ScreenKind::Teachers,
            ActiveScreen::Assignments(_) => ScreenKind::Assignments,
            ActiveScreen::Results(_) => ScreenKind::Results,
            ActiveScreen::Submissions(_) => ScreenKind::Submissions,
        }
    }

    pub fn mount_id(&self) -> u64 {
        with_screen!(self, screen => screen.mount_id())
    }

    pub fn row_count(&self) -> usize {
        with_screen!(self, screen => screen.list().len())
    }

    pub fn view(&self) -> ScreenView {
        with_screen!(self, screen => ScreenView::of(self.kind(), screen))
    }
}

#[derive(Debug, Clone)]
pub struct FieldView {
    pub label: &'static str,
    pub value: String,
    pub required: bool,
}

/// Everything the renderer needs from a screen, already flattened to text.
#[derive(Debug, Clone)]
pub struct ScreenView {
    pub title: &'static str,
    pub label: &'static str,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
    pub fields: Vec<FieldView>,
    pub focused_field: usize,
    /// Id of the record loaded into the form, if any.
    pub editing: Option<String>,
    pub editable: bool,
    pub in_flight: usize,
    pub live: bool,
}

impl ScreenView {
    fn of<T: Record>(kind: ScreenKind, screen: &Screen<T>) -> Self {
        let form = screen.form();
        let editing = match form.state() {
            FormState::Editing { id } => Some(id),
            FormState::Empty => None,
        };
        let fields = T::FIELDS
            .iter()
            .map(|field| {
                let raw = form.value(field.name);
                let value = match field.kind {
                    FieldKind::Password => "*".repeat(raw.chars().count()),
                    _ => raw.to_string(),
                };
                FieldView {
                    label: field.label,
                    value,
                    required: field.is_required(editing.is_some()),
                }
            })
            .collect();

        Self {
            title: kind.title(),
            label: T::LABEL,
            columns: T::COLUMNS,
            rows: screen.rows().iter().map(|s| s.record.cells()).collect(),
            fields,
            focused_field: form.focus(),
            editing,
            editable: T::EDITABLE,
            in_flight: screen.in_flight(),
            live: screen.list().is_live(),
        }
    }
}

pub struct Dashboard {
    pub session: Session,
    pub role: Role,
    pub tab: usize,
    pub screen: ActiveScreen,
    pub focus: Focus,
    pub selected_row: usize,
}

impl Dashboard {
    pub fn tabs(&self) -> &'static [ScreenKind] {
        ScreenKind::for_role(self.role)
    }
}

pub enum AppState {
    Login {
        email: String,
        password: String,
        focused_field: LoginField,
        error: Option<String>,
    },
    Dashboard(Box<Dashboard>),
}

impl AppState {
    pub fn login() -> Self {
        AppState::Login {
            email: String::new(),
            password: String::new(),
            focused_field: LoginField::Email,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MemoryBlobStore, MemoryStore, Principal};
    use std::sync::Arc;
    use std::time::Duration;

    fn session() -> Session {
        Session {
            principal: Principal {
                uid: "local-admin".to_string(),
                email: "admin@gmail.com".to_string(),
                id_token: None,
            },
            store: Arc::new(MemoryStore::new()),
            blobs: Arc::new(MemoryBlobStore),
        }
    }

    #[test]
    fn test_tabs_per_role() {
        assert_eq!(
            ScreenKind::for_role(Role::Admin),
            &[ScreenKind::Students, ScreenKind::Teachers]
        );
        assert_eq!(
            ScreenKind::for_role(Role::Teacher),
            &[ScreenKind::Assignments, ScreenKind::Results]
        );
        assert_eq!(ScreenKind::for_role(Role::Student), &[ScreenKind::Submissions]);
    }

    #[test]
    fn test_view_masks_password_input() {
        let notices = Notifier::new(Duration::from_millis(3000));
        let mut active = ActiveScreen::open(ScreenKind::Teachers, &session(), SyncMode::Pull, &notices);
        if let ActiveScreen::Teachers(screen) = &mut active {
            screen.form_mut().set_field("name", "Ravi");
            screen.form_mut().set_field("password", "hunter2");
        }

        let view = active.view();
        assert_eq!(view.title, "Manage Teachers");
        assert_eq!(view.fields[0].value, "Ravi");
        assert_eq!(view.fields[4].label, "Password");
        assert_eq!(view.fields[4].value, "*******");
        assert!(view.fields[4].required);
        assert!(view.editing.is_none());
        assert!(view.editable);
        assert!(view.rows.is_empty());
    }

    #[test]
    fn test_each_open_is_a_new_mount() {
        let notices = Notifier::new(Duration::from_millis(3000));
        let session = session();
        let first = ActiveScreen::open(ScreenKind::Results, &session, SyncMode::Pull, &notices);
        let second = ActiveScreen::open(ScreenKind::Results, &session, SyncMode::Pull, &notices);
        assert_eq!(first.kind(), ScreenKind::Results);
        assert_ne!(first.mount_id(), second.mount_id());
    }
}

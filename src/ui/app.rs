use crate::api::{Backend, Session};
use crate::config::{Config, SyncMode};
use crate::error::LmsResult;
use crate::export;
use crate::sync::{DeleteOutcome, Notifier, WriteOutcome};
use crate::ui::render::render_ui;
use crate::ui::state::{with_screen, ActiveScreen, AppState, Dashboard, Focus, LoginField, ScreenKind};
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::Path;
use tokio::sync::mpsc;

/// Gateway work that finished in the background.
enum Completion {
    Write(WriteOutcome),
    Delete(DeleteOutcome),
}

pub struct App {
    backend: Backend,
    config: Config,
    state: AppState,
    notices: Notifier,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl App {
    pub fn new(backend: Backend, config: Config) -> Self {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        Self {
            notices: Notifier::new(config.notice_timeout),
            backend,
            config,
            state: AppState::login(),
            completion_tx,
            completions,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Main event loop
        let result = self.event_loop(&mut terminal).await;

        // Tear down the mounted screen before leaving
        self.state = AppState::login();

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        let backend_label = self.backend.describe();

        loop {
            self.drain_completions();
            self.clamp_selection();

            let notice = self.notices.current();
            terminal.draw(|f| render_ui(f, &self.state, notice.as_ref(), &backend_label))?;

            // Check for keyboard events with a short timeout
            if event::poll(std::time::Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if self.handle_key_event(key).await? {
                        break; // User quit
                    }
                }
            }

            // Small yield so feeds and background writes can make progress
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        Ok(())
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            match &mut self.state {
                AppState::Dashboard(dash) => {
                    deliver(&mut dash.screen, completion);
                }
                AppState::Login { .. } => {
                    log::debug!("Dropping completion that arrived after sign-out")
                }
            }
        }
    }

    fn clamp_selection(&mut self) {
        if let AppState::Dashboard(dash) = &mut self.state {
            let rows = dash.screen.row_count();
            dash.selected_row = dash.selected_row.min(rows.saturating_sub(1));
        }
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match self.state {
            AppState::Login { .. } => self.handle_login_key(key).await,
            AppState::Dashboard(_) => self.handle_dashboard_key(key).await,
        }
    }

    async fn handle_login_key(&mut self, key: KeyEvent) -> Result<bool> {
        let AppState::Login {
            email,
            password,
            focused_field,
            error,
        } = &mut self.state
        else {
            return Ok(false);
        };

        match key.code {
            KeyCode::Esc => return Ok(true),
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                *focused_field = match focused_field {
                    LoginField::Email => LoginField::Password,
                    LoginField::Password => LoginField::Email,
                };
            }
            KeyCode::Char(c) => match focused_field {
                LoginField::Email => email.push(c),
                LoginField::Password => password.push(c),
            },
            KeyCode::Backspace => {
                match focused_field {
                    LoginField::Email => email.pop(),
                    LoginField::Password => password.pop(),
                };
            }
            KeyCode::Enter => {
                *error = None;
                let email = email.trim().to_string();
                let password = password.clone();
                self.sign_in(&email, &password).await;
            }
            _ => {}
        }

        Ok(false)
    }

    async fn sign_in(&mut self, email: &str, password: &str) {
        let outcome: LmsResult<Session> = async {
            let auth = self.backend.auth()?;
            let principal = auth.sign_in(email, password).await?;
            self.backend.connect(principal)
        }
        .await;

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Sign-in failed for {}: {}", email, e);
                if let AppState::Login { error, password, .. } = &mut self.state {
                    *error = Some(e.to_string());
                    password.clear();
                }
                return;
            }
        };

        let role = self.config.roles.role_for(&session.principal.email);
        log::info!("{} signed in as {}", session.principal.email, role);

        let kind = ScreenKind::for_role(role)[0];
        let mut screen = ActiveScreen::open(kind, &session, self.config.sync_mode, &self.notices);
        mount(&mut screen).await;

        self.state = AppState::Dashboard(Box::new(Dashboard {
            session,
            role,
            tab: 0,
            screen,
            focus: Focus::Form,
            selected_row: 0,
        }));
    }

    async fn handle_dashboard_key(&mut self, key: KeyEvent) -> Result<bool> {
        let notices = &self.notices;
        let sync_mode = self.config.sync_mode;
        let tx = &self.completion_tx;
        let AppState::Dashboard(dash) = &mut self.state else {
            return Ok(false);
        };

        if matches!(key.code, KeyCode::Tab | KeyCode::BackTab) {
            dash.focus = match dash.focus {
                Focus::Form => Focus::Table,
                Focus::Table => Focus::Form,
            };
            return Ok(false);
        }

        match dash.focus {
            Focus::Form => match key.code {
                KeyCode::Up => with_screen!(&mut dash.screen, s => s.form_mut().focus_prev()),
                KeyCode::Down => with_screen!(&mut dash.screen, s => s.form_mut().focus_next()),
                KeyCode::Char(c) => with_screen!(&mut dash.screen, s => s.form_mut().push_char(c)),
                KeyCode::Backspace => with_screen!(&mut dash.screen, s => s.form_mut().pop_char()),
                KeyCode::Enter => with_screen!(&mut dash.screen, s => {
                    if let Ok(pending) = s.prepare_submit() {
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            // The receiver only goes away when the app exits.
                            let _ = tx.send(Completion::Write(pending.execute().await));
                        });
                    }
                }),
                KeyCode::Esc => {
                    let editing = with_screen!(&dash.screen, s => s.form().is_editing());
                    if editing {
                        with_screen!(&mut dash.screen, s => s.cancel_edit());
                    } else {
                        dash.focus = Focus::Table;
                    }
                }
                _ => {}
            },
            Focus::Table => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('l') => {
                    log::info!("{} signed out", dash.session.principal.email);
                    notices.clear();
                    self.state = AppState::login();
                }
                KeyCode::Up => dash.selected_row = dash.selected_row.saturating_sub(1),
                KeyCode::Down => {
                    if dash.selected_row + 1 < dash.screen.row_count() {
                        dash.selected_row += 1;
                    }
                }
                KeyCode::Left | KeyCode::Right => {
                    let tabs = dash.tabs();
                    if tabs.len() > 1 {
                        let next = if key.code == KeyCode::Right {
                            (dash.tab + 1) % tabs.len()
                        } else {
                            (dash.tab + tabs.len() - 1) % tabs.len()
                        };
                        switch_screen(dash, next, sync_mode, notices).await;
                    }
                }
                KeyCode::Char('e') => {
                    let row = dash.selected_row;
                    let loaded = with_screen!(&mut dash.screen, s => s.edit_row(row));
                    if let Ok(true) = loaded {
                        dash.focus = Focus::Form;
                    }
                }
                KeyCode::Char('d') => {
                    let row = dash.selected_row;
                    with_screen!(&mut dash.screen, s => {
                        if let Ok(Some(pending)) = s.prepare_delete(row) {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                let _ = tx.send(Completion::Delete(pending.execute().await));
                            });
                        }
                    });
                }
                KeyCode::Char('r') => {
                    let refreshed = with_screen!(&dash.screen, s => s.list().refresh().await);
                    if let Err(e) = refreshed {
                        log::warn!("Manual refresh failed: {}", e);
                        notices.show_error(e.to_string());
                    }
                }
                KeyCode::Char('x') => {
                    let exported = with_screen!(&dash.screen, s => export::export_rows(&s.rows(), Path::new(".")));
                    match exported {
                        Ok(path) => notices.show_info(format!("Exported to {}", path.display())),
                        Err(e) => {
                            log::warn!("Export failed: {:#}", e);
                            notices.show_error(format!("Export failed: {}", e));
                        }
                    }
                }
                KeyCode::Esc => dash.focus = Focus::Form,
                _ => {}
            },
        }

        Ok(false)
    }
}

/// Apply a finished gateway call to the screen that started it, then re-list
/// if needed. Returns false, touching nothing, when the call belongs to a
/// screen that has since been replaced.
fn deliver(screen: &mut ActiveScreen, completion: Completion) -> bool {
    let mount_id = match &completion {
        Completion::Write(outcome) => outcome.mount_id,
        Completion::Delete(outcome) => outcome.mount_id,
    };
    if mount_id != screen.mount_id() {
        log::debug!("Dropping completion for unmounted screen #{}", mount_id);
        return false;
    }

    match completion {
        Completion::Write(outcome) => with_screen!(screen, s => {
            if s.finish_submit(outcome).is_ok() {
                s.sync_in_background();
            }
        }),
        Completion::Delete(outcome) => with_screen!(screen, s => {
            if s.finish_delete(outcome).is_ok() {
                s.sync_in_background();
            }
        }),
    }
    true
}

/// Attach a freshly opened screen. Failures are already on the notice
/// banner; the screen stays usable and can be refreshed by hand.
async fn mount(screen: &mut ActiveScreen) {
    let mounted = with_screen!(screen, s => s.mount().await);
    if let Err(e) = mounted {
        log::warn!("Mounting {:?} failed: {}", screen.kind(), e);
    }
}

async fn switch_screen(
    dash: &mut Dashboard,
    tab: usize,
    sync_mode: SyncMode,
    notices: &Notifier,
) {
    with_screen!(&mut dash.screen, s => s.unmount());

    let kind = dash.tabs()[tab];
    let mut next = ActiveScreen::open(kind, &dash.session, sync_mode, notices);
    mount(&mut next).await;

    // Dropping the old screen releases whatever it still held.
    dash.screen = next;
    dash.tab = tab;
    dash.selected_row = 0;
    dash.focus = Focus::Form;
}

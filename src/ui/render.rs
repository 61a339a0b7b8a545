use crate::sync::{Notice, NoticeLevel};
use crate::ui::state::{AppState, Dashboard, Focus, LoginField, ScreenView};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame,
};

const APP_TITLE: &str = "School LMS";

pub fn render_ui(frame: &mut Frame, state: &AppState, notice: Option<&Notice>, backend: &str) {
    match state {
        AppState::Login {
            email,
            password,
            focused_field,
            error,
        } => render_login(frame, email, password, *focused_field, error.as_deref(), backend),
        AppState::Dashboard(dash) => render_dashboard(frame, dash, notice),
    }
}

fn field_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn render_login(
    frame: &mut Frame,
    email: &str,
    password: &str,
    focused_field: LoginField,
    error: Option<&str>,
    backend: &str,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    // Title
    let title = Paragraph::new(format!("{} | {}", APP_TITLE, backend))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(title, chunks[0]);

    let email_input = Paragraph::new(format!("Email: {}_", email)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(field_style(focused_field == LoginField::Email)),
    );

    frame.render_widget(email_input, chunks[1]);

    let masked = "*".repeat(password.chars().count());
    let password_input = Paragraph::new(format!("Password: {}_", masked)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(field_style(focused_field == LoginField::Password)),
    );

    frame.render_widget(password_input, chunks[2]);

    if let Some(message) = error {
        let text = vec![
            Line::from(vec![Span::styled(
                "Sign-in failed",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )]),
            Line::from(message),
        ];
        let paragraph = Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });

        frame.render_widget(paragraph, chunks[3]);
    }

    let help = Paragraph::new("[Tab: Switch Field | Enter: Sign In | Esc: Quit]")
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(help, chunks[4]);
}

fn render_dashboard(frame: &mut Frame, dash: &Dashboard, notice: Option<&Notice>) {
    let area = frame.area();
    let view = dash.screen.view();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    // Tabs for the signed-in role
    let titles: Vec<&str> = dash.tabs().iter().map(|kind| kind.title()).collect();
    let tabs = Tabs::new(titles)
        .select(dash.tab)
        .block(
            Block::default()
                .title(format!(
                    "{} | {} ({})",
                    APP_TITLE, dash.session.principal.email, dash.role
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    frame.render_widget(tabs, chunks[0]);

    render_notice(frame, chunks[1], notice);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[2]);

    render_form(frame, body[0], &view, dash.focus == Focus::Form);
    render_table(frame, body[1], &view, dash);

    let help = match dash.focus {
        Focus::Form => "[↑↓: Field | Enter: Save | Esc: Cancel Edit | Tab: Table | Ctrl+C: Quit]",
        Focus::Table if view.editable => {
            "[↑↓: Row | ←→: Screen | e: Edit | d: Delete | r: Refresh | x: Export | l: Sign Out | q: Quit]"
        }
        Focus::Table => "[↑↓: Row | ←→: Screen | r: Refresh | x: Export | l: Sign Out | q: Quit]",
    };
    let help = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(help, chunks[3]);
}

fn render_notice(frame: &mut Frame, area: Rect, notice: Option<&Notice>) {
    let Some(notice) = notice else {
        return;
    };

    let color = match notice.level {
        NoticeLevel::Info => Color::Green,
        NoticeLevel::Error => Color::Red,
    };
    let banner = Paragraph::new(notice.message.as_str())
        .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);

    frame.render_widget(banner, area);
}

fn render_form(frame: &mut Frame, area: Rect, view: &ScreenView, focused: bool) {
    let lines: Vec<Line> = view
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let active = focused && i == view.focused_field;
            let prefix = if active { "> " } else { "  " };
            let marker = if field.required { "*" } else { "" };
            let cursor = if active { "_" } else { "" };
            Line::from(vec![
                Span::styled(
                    format!("{}{}{}: ", prefix, field.label, marker),
                    field_style(active),
                ),
                Span::raw(format!("{}{}", field.value, cursor)),
            ])
        })
        .collect();

    let title = match &view.editing {
        Some(id) => format!("Edit {} {}", view.label, id),
        None => format!("Add {}", view.label),
    };
    let title = if view.in_flight > 0 {
        format!("{} (saving...)", title)
    } else {
        title
    };

    let border = if focused { Color::Yellow } else { Color::Cyan };
    let form = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(form, area);
}

fn render_table(frame: &mut Frame, area: Rect, view: &ScreenView, dash: &Dashboard) {
    let header = Row::new(view.columns.iter().map(|c| Cell::from(*c)))
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = view
        .rows
        .iter()
        .map(|cells| Row::new(cells.iter().map(|c| Cell::from(c.as_str()))))
        .collect();

    let widths = vec![Constraint::Fill(1); view.columns.len()];
    let sync = if view.live { "live" } else { "pull" };
    let border = if dash.focus == Focus::Table {
        Color::Yellow
    } else {
        Color::Cyan
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(format!("{} | {} record(s) | {}", view.title, view.rows.len(), sync))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut table_state = TableState::default();
    if !view.rows.is_empty() {
        table_state.select(Some(dash.selected_row));
    }

    frame.render_stateful_widget(table, area, &mut table_state);
}

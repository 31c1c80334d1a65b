use chrono::{Local, NaiveDate};
use curbside_core::{CollectionType, RecyclingColor, RouteSchedule, ScheduleEvent};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};

use crate::app::{App, Screen};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("curbside · trash and recycling pickup calendar")
        .block(Block::default().borders(Borders::ALL).title("Curbside"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::TownSelect => draw_town_select(frame, app, *content_area),
        Screen::AddressEntry => draw_address_entry(frame, app, *content_area),
        Screen::ScheduleView => draw_schedule_view(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::TownSelect => "↑/↓ move · Enter/Space select town · q/Ctrl-C quit",
        Screen::AddressEntry => {
            "Type an address · Enter show schedule · ↑/↓ + Tab use suggestion · Esc back · Ctrl-C quit"
        }
        Screen::ScheduleView => "Esc/←/b back to address · q/Ctrl-C quit",
    };

    let status_text = if app.is_loading {
        format!("Loading… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else if app.screen == Screen::AddressEntry
        && let Some(summary) = &app.town_summary
    {
        format!("{summary} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_town_select(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let items = app
        .towns
        .iter()
        .enumerate()
        .map(|(idx, town)| {
            let prefix = if idx == app.town_list_index { "> " } else { "  " };
            ListItem::new(format!("{prefix}{}", town.name))
        })
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Select town (↑/↓, Enter)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.towns.is_empty() {
        state.select(Some(app.town_list_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_address_entry(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // input
            Constraint::Min(0),    // suggestions
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [input_area, suggestions_area] = chunks else {
        return;
    };

    let input = Paragraph::new(app.address_input.as_str())
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Address in {} (\"65 Boston Road\" or \"Boston Rd 65\", Enter)",
            app.selected_town_name()
        )))
        .wrap(Wrap { trim: true });

    frame.render_widget(input, *input_area);

    let items = if app.suggestions.is_empty() {
        vec![ListItem::new(
            "Streets with house-number splits need a number; unknown streets get suggestions here.",
        )]
    } else {
        app.suggestions
            .iter()
            .map(|street| ListItem::new(street.as_str()))
            .collect()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Did you mean (↑/↓, Tab)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.suggestions.is_empty() {
        state.select(Some(app.suggestion_index));
    }
    frame.render_stateful_widget(list, *suggestions_area, &mut state);
}

fn draw_schedule_view(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let Some(schedule) = &app.schedule else {
        let paragraph = Paragraph::new("No schedule loaded.")
            .block(Block::default().borders(Borders::ALL).title("Schedule"));
        frame.render_widget(paragraph, area);
        return;
    };

    let title = format!(
        "{} in {} (Esc/←/b to go back)",
        schedule_heading(schedule),
        app.selected_town_name()
    );

    if schedule.events.is_empty() {
        let paragraph = Paragraph::new(format!(
            "No pickups in the {} days from {}.",
            schedule.days, schedule.start
        ))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let today = Local::now().date_naive();
    let rows = schedule.events.iter().map(|event| {
        let date = event.date.format("%Y-%m-%d").to_string();
        let weekday = event.date.format("%a").to_string();
        let relative = relative_day_label(event.date, today);

        let mut style = Style::default().fg(event_color(event, schedule.recycling_color));
        if event.date <= today {
            style = style.add_modifier(Modifier::BOLD);
        }

        Row::new(vec![
            Cell::from(date),
            Cell::from(weekday),
            Cell::from(relative),
            Cell::from(event_label(event, schedule.recycling_color)),
        ])
        .style(style)
    });

    let column_widths = [
        Constraint::Length(12),
        Constraint::Length(5),
        Constraint::Length(12),
        Constraint::Min(20),
    ];

    let table = Table::new(rows, column_widths)
        .header(
            Row::new(vec!["Date", "Day", "In", "Pickup"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(1);

    frame.render_widget(table, area);
}

fn schedule_heading(schedule: &RouteSchedule) -> String {
    let color = schedule
        .recycling_color
        .map_or_else(|| "no".to_owned(), |color| color.to_string());
    match &schedule.route {
        Some(route) => format!(
            "{} · {} trash · {color} recycling",
            route.street, schedule.weekday
        ),
        None => format!("{} trash · {color} recycling", schedule.weekday),
    }
}

fn event_label(event: &ScheduleEvent, color: Option<RecyclingColor>) -> String {
    let kinds: Vec<String> = event
        .types
        .iter()
        .map(|kind| match (kind, color) {
            (CollectionType::Recycling, Some(color)) => format!("Recycling ({color})"),
            (CollectionType::Recycling, None) => "Recycling".to_owned(),
            (CollectionType::Trash, _) => "Trash".to_owned(),
        })
        .collect();
    kinds.join(" + ")
}

fn event_color(event: &ScheduleEvent, color: Option<RecyclingColor>) -> Color {
    match color {
        Some(RecyclingColor::Blue) if event.has(CollectionType::Recycling) => Color::Blue,
        Some(RecyclingColor::Green) if event.has(CollectionType::Recycling) => Color::Green,
        _ => Color::Gray,
    }
}

fn relative_day_label(date: NaiveDate, today: NaiveDate) -> String {
    let delta = (date - today).num_days();
    match delta {
        0 => "today".to_owned(),
        1 => "tomorrow".to_owned(),
        days if days > 1 => format!("in {days} days"),
        -1 => "yesterday".to_owned(),
        days => format!("{} days ago", days.abs()),
    }
}

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use curbside_core::RouteQuery;

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Fetch street count and snapshot stamp for the chosen town
    LoadTownSummary,
    /// Run `service.schedule`(...) for the typed address
    LoadSchedule,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Backspace, Char, Down, Enter, Esc, Left, Tab, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    // 'q' is a letter in street names while typing an address.
    if key.code == Char('q') && key.modifiers.is_empty() && app.screen != Screen::AddressEntry {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::TownSelect => match key.code {
            Up | Char('k') => {
                app.town_list_index = app.town_list_index.saturating_sub(1);
            }
            Down | Char('j') => {
                if app.town_list_index + 1 < app.towns.len() {
                    app.town_list_index += 1;
                }
            }
            Enter | Char(' ') => {
                if app.select_current_town() {
                    action = Action::LoadTownSummary;
                }
            }
            _ => {}
        },

        Screen::AddressEntry => match key.code {
            Up => {
                app.suggestion_index = app.suggestion_index.saturating_sub(1);
            }
            Down => {
                if app.suggestion_index + 1 < app.suggestions.len() {
                    app.suggestion_index += 1;
                }
            }
            Char(character) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    app.address_input.push(character);
                }
            }
            Backspace => {
                app.address_input.pop();
            }
            Tab => {
                app.accept_suggestion();
            }
            Enter => {
                action = Action::LoadSchedule;
            }
            Esc => {
                app.screen = Screen::TownSelect;
                app.suggestions.clear();
                app.error_message = None;
            }
            _ => {}
        },

        Screen::ScheduleView => match key.code {
            Left | Esc | Char('b') => {
                app.screen = Screen::AddressEntry;
            }
            _ => {}
        },
    }
    action
}

/// Split free-form address text into street and house number.
///
/// Text after the first comma (town, state, zip) is ignored. A leading number
/// ("65 Boston Road") is the house number; otherwise the whole text is the street, so
/// numbered streets like "Route 110" stay intact. See [`trailing_number_reading`].
pub(crate) fn parse_address_input(input: &str) -> Option<RouteQuery> {
    let primary = input.split(',').next().unwrap_or_default();
    let parts: Vec<&str> = primary.split_whitespace().collect();

    let (number, street_parts) = match parts.as_slice() {
        [] => return None,
        [first, rest @ ..] if !rest.is_empty() => match house_number(first) {
            Some(number) => (Some(number), rest),
            None => (None, parts.as_slice()),
        },
        all => (None, all),
    };
    Some(RouteQuery::new(street_parts.join(" "), number))
}

/// Second reading of a number-less query with the last word as house number
/// ("Boston Rd 65"). Only worth trying when the whole text is not a known street.
pub(crate) fn trailing_number_reading(query: &RouteQuery) -> Option<RouteQuery> {
    if query.number.is_some() {
        return None;
    }
    let parts: Vec<&str> = query.street.split_whitespace().collect();
    match parts.as_slice() {
        [rest @ .., last] if !rest.is_empty() => {
            house_number(last).map(|number| RouteQuery::new(rest.join(" "), Some(number)))
        }
        _ => None,
    }
}

/// House number typed anywhere in the input, leading or trailing.
pub(crate) fn typed_house_number(input: &str) -> Option<u32> {
    let query = parse_address_input(input)?;
    query
        .number
        .or_else(|| trailing_number_reading(&query).and_then(|reading| reading.number))
}

/// Plain digits that fit a `u32`.
fn house_number(token: &str) -> Option<u32> {
    if token.chars().all(|ch| ch.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

use std::sync::Arc;

use curbside_core::{
    CollectionService, ResolveError, RouteSchedule, SnapshotInfo, StreetList, TownId, TownMeta,
};

use crate::input::typed_house_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    TownSelect,
    AddressEntry,
    ScheduleView,
}

pub(crate) struct App {
    pub service: Arc<CollectionService>,
    /// Window length sent with every request; `None` uses the town default.
    pub days: Option<u32>,

    pub screen: Screen,
    pub towns: Vec<TownMeta>,
    pub town_list_index: usize,
    pub selected_town: Option<TownId>,
    /// Street count and snapshot stamp of the selected town.
    pub town_summary: Option<String>,

    pub address_input: String,
    pub suggestions: Vec<String>,
    pub suggestion_index: usize,

    pub schedule: Option<RouteSchedule>,

    pub is_loading: bool,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new(service: Arc<CollectionService>, days: Option<u32>) -> Self {
        let towns = service.towns();
        Self {
            service,
            days,
            screen: Screen::TownSelect,
            towns,
            town_list_index: 0,
            selected_town: None,
            town_summary: None,
            address_input: String::new(),
            suggestions: Vec::new(),
            suggestion_index: 0,
            schedule: None,
            is_loading: false,
            error_message: None,
        }
    }

    pub(crate) fn selected_town_name(&self) -> &str {
        self.selected_town
            .as_ref()
            .and_then(|id| self.towns.iter().find(|town| &town.id == id))
            .map_or("<no town>", |town| town.name.as_str())
    }

    /// Returns whether a town was selected.
    pub(crate) fn select_current_town(&mut self) -> bool {
        let Some(town) = self.towns.get(self.town_list_index) else {
            return false;
        };
        if self.selected_town.as_ref() != Some(&town.id) {
            self.town_summary = None;
        }
        self.selected_town = Some(town.id.clone());
        self.screen = Screen::AddressEntry;
        true
    }

    pub(crate) fn show_town_summary(&mut self, streets: &StreetList, info: &SnapshotInfo) {
        let stamp = info.meta.as_ref().map_or_else(
            || "unstamped".to_owned(),
            |meta| {
                let built = meta.generated_at.format("%Y-%m-%d %H:%M UTC");
                match &meta.git_commit {
                    Some(commit) => format!("built {built} ({commit})"),
                    None => format!("built {built}"),
                }
            },
        );
        self.town_summary = Some(format!(
            "{} streets · {} routes · snapshot v{} {stamp}",
            streets.count, info.routes, info.schema_version
        ));
    }

    pub(crate) fn show_schedule(&mut self, schedule: RouteSchedule) {
        self.schedule = Some(schedule);
        self.suggestions.clear();
        self.suggestion_index = 0;
        self.error_message = None;
        self.screen = Screen::ScheduleView;
    }

    pub(crate) fn show_resolve_error(&mut self, err: ResolveError) {
        self.error_message = Some(if err.suggestions.is_empty() {
            err.message
        } else {
            format!("{} (Tab picks a suggestion)", err.message)
        });
        self.suggestions = err.suggestions;
        self.suggestion_index = 0;
    }

    /// Replace the street in the input with the highlighted suggestion, keeping the number.
    pub(crate) fn accept_suggestion(&mut self) {
        let Some(street) = self.suggestions.get(self.suggestion_index) else {
            return;
        };
        let number = typed_house_number(&self.address_input);
        self.address_input = match number {
            Some(number) => format!("{number} {street}"),
            None => street.clone(),
        };
        self.suggestions.clear();
        self.suggestion_index = 0;
        self.error_message = None;
    }
}

// View controller for the itinerary page
// Owns every region it renders into. render, switch_tab and show_error are
// the only ways the view changes.

use std::fmt::Write;
use tracing::{debug, error, info};

use crate::config::{IndicatorKind, MapConfig};
use crate::itinerary::{Day, Itinerary};
use crate::loader::IndicatorPanel;
use crate::map::MapView;
use crate::markup;

pub const ITINERARY_CONTAINER_ID: &str = "itinerary-container";
pub const TAB_NAV_ID: &str = "tab-nav";
pub const TAB_CONTENT_ID: &str = "tab-content";
pub const MAP_ID: &str = "map";

/// The element ids present in the host page.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPage {
    pub title: String,
    pub element_ids: Vec<String>,
}

impl HostPage {
    pub fn standard() -> Self {
        Self::with_elements(&[
            ITINERARY_CONTAINER_ID,
            TAB_NAV_ID,
            TAB_CONTENT_ID,
            MAP_ID,
            IndicatorKind::Chromium.element_id(),
            IndicatorKind::Webkit.element_id(),
        ])
    }

    pub fn with_elements(ids: &[&str]) -> Self {
        Self {
            title: "Travel Itinerary".to_string(),
            element_ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.element_ids.iter().any(|e| e == id)
    }

    fn region(&self, id: &str) -> Option<Region> {
        self.has(id).then(|| Region::new(id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub html: String,
}

impl Region {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            html: String::new(),
        }
    }

    fn clear(&mut self) {
        self.html.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub label: String,
    pub pane_html: String,
    pub active: bool,
}

impl Tab {
    fn for_day(index: usize, day: &Day) -> Self {
        Self {
            label: markup::tab_label(index, day),
            pane_html: markup::day_pane(day),
            active: false,
        }
    }
}

pub struct ViewController {
    page_title: String,
    map_config: MapConfig,
    list: Option<Region>,
    tab_nav: Option<Region>,
    tab_content: Option<Region>,
    map_region: Option<Region>,
    indicators: Vec<IndicatorKind>,
    tabs: Vec<Tab>,
    active_tab: Option<usize>,
    error: Option<String>,
    map: Option<MapView>,
}

impl ViewController {
    /// Binds to the containers the page provides. Missing containers are not
    /// an error; the steps that need them are skipped at render time.
    pub fn attach(page: &HostPage, map_config: MapConfig) -> Self {
        let indicators = [IndicatorKind::Chromium, IndicatorKind::Webkit]
            .into_iter()
            .filter(|kind| page.has(kind.element_id()))
            .collect();

        Self {
            page_title: page.title.clone(),
            map_config,
            list: page.region(ITINERARY_CONTAINER_ID),
            tab_nav: page.region(TAB_NAV_ID),
            tab_content: page.region(TAB_CONTENT_ID),
            map_region: page.region(MAP_ID),
            indicators,
            tabs: Vec::new(),
            active_tab: None,
            error: None,
            map: None,
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_tab(&self) -> Option<usize> {
        self.active_tab
    }

    pub fn map(&self) -> Option<&MapView> {
        self.map.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tab_nav_html(&self) -> Option<&str> {
        self.tab_nav.as_ref().map(|r| r.html.as_str())
    }

    pub fn tab_content_html(&self) -> Option<&str> {
        self.tab_content.as_ref().map(|r| r.html.as_str())
    }

    pub fn list_html(&self) -> Option<&str> {
        self.list.as_ref().map(|r| r.html.as_str())
    }

    /// Replaces the whole view with the given document.
    pub fn render(&mut self, itinerary: &Itinerary) {
        self.error = None;
        self.render_list(&itinerary.days);
        self.build_tabs(&itinerary.days);
        if !self.tabs.is_empty() {
            self.switch_tab(0);
        }
        self.build_map(itinerary);
        info!(
            days = itinerary.days.len(),
            places = itinerary.place_count(),
            markers = self.map.as_ref().map_or(0, MapView::marker_count),
            "itinerary rendered"
        );
    }

    pub fn build_tabs(&mut self, days: &[Day]) {
        // Rebuild from scratch so repeated calls never accumulate
        self.tabs.clear();
        self.active_tab = None;

        if self.tab_nav.is_none() || self.tab_content.is_none() {
            error!(
                nav = TAB_NAV_ID,
                content = TAB_CONTENT_ID,
                "tab containers not found, skipping tabs"
            );
            if let Some(content) = self.tab_content.as_mut() {
                content.clear();
            }
            return;
        }

        self.tabs = days
            .iter()
            .enumerate()
            .map(|(index, day)| Tab::for_day(index, day))
            .collect();
        self.sync_tab_regions();
        debug!(tabs = self.tabs.len(), "tabs built");
    }

    /// Activates exactly one tab. Out-of-range indices leave everything as is.
    pub fn switch_tab(&mut self, index: usize) -> bool {
        if index >= self.tabs.len() {
            debug!(index, tabs = self.tabs.len(), "ignoring out-of-range tab switch");
            return false;
        }

        for (i, tab) in self.tabs.iter_mut().enumerate() {
            tab.active = i == index;
        }
        self.active_tab = Some(index);
        self.sync_tab_regions();
        true
    }

    /// Swaps the tab content for a diagnostic block and clears the day list
    /// of any earlier document. Leaves the map alone and works whether or not
    /// anything was rendered before.
    pub fn show_error(&mut self, message: &str) {
        error!(error = message, "showing load error");
        self.tabs.clear();
        self.active_tab = None;
        self.error = Some(message.to_string());

        let block = markup::error_block(message);
        if let Some(nav) = self.tab_nav.as_mut() {
            nav.clear();
        }

        match (self.tab_content.as_mut(), self.list.as_mut()) {
            (Some(content), list) => {
                content.html = block;
                if let Some(list) = list {
                    list.clear();
                }
            }
            (None, Some(list)) => list.html = block,
            (None, None) => error!("no container available for the error message"),
        }
    }

    fn render_list(&mut self, days: &[Day]) {
        match self.list.as_mut() {
            Some(list) => list.html = markup::day_list(days),
            None => debug!(id = ITINERARY_CONTAINER_ID, "no list container, skipping day list"),
        }
    }

    fn build_map(&mut self, itinerary: &Itinerary) {
        if self.map_region.is_none() {
            error!(id = MAP_ID, "map element not found, skipping map");
            self.map = None;
            return;
        }

        let mut map = MapView::new(&self.map_config);
        map.plot(itinerary);
        self.map = Some(map);
    }

    fn sync_tab_regions(&mut self) {
        let (Some(nav), Some(content)) = (self.tab_nav.as_mut(), self.tab_content.as_mut()) else {
            return;
        };

        nav.clear();
        content.clear();
        for (index, tab) in self.tabs.iter().enumerate() {
            let class = if tab.active { "tab active" } else { "tab" };
            let _ = write!(
                nav.html,
                r#"<button class="{}" data-tab="{}">{}</button>"#,
                class, index, tab.label
            );
            let class = if tab.active { "tab-pane active" } else { "tab-pane" };
            let _ = write!(
                content.html,
                r#"<section class="{}" data-tab="{}">{}</section>"#,
                class, index, tab.pane_html
            );
        }
    }

    /// The whole page as it currently stands, ready to serve.
    pub fn to_html(&self, indicator_state: Option<&IndicatorPanel>) -> String {
        let mut body = String::new();

        for kind in &self.indicators {
            let visible = indicator_state.map_or(false, |panel| panel.is_visible(*kind));
            let _ = write!(
                body,
                r#"<div id="{}" class="loading" style="display:{}">Loading…</div>"#,
                kind.element_id(),
                if visible { "block" } else { "none" }
            );
        }

        for region in [&self.tab_nav, &self.tab_content, &self.list, &self.map_region]
            .into_iter()
            .flatten()
        {
            let _ = write!(body, r#"<div id="{}">{}</div>"#, region.id, region.html);
        }

        let script = match (&self.map, &self.map_region) {
            (Some(map), Some(region)) => format!(
                r#"<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script><script>{}</script>"#,
                map.leaflet_script(&region.id)
            ),
            _ => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title}</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"/>
  <style>.tab-pane{{display:none}}.tab-pane.active{{display:block}}#map{{height:480px}}</style>
</head>
<body>
{body}
<script>
document.querySelectorAll('#{nav} .tab').forEach(function(btn) {{
  btn.addEventListener('click', function() {{
    var i = btn.getAttribute('data-tab');
    document.querySelectorAll('[data-tab]').forEach(function(el) {{
      el.classList.toggle('active', el.getAttribute('data-tab') === i);
    }});
  }});
}});
</script>
{script}
</body>
</html>"#,
            title = markup::escape_html(&self.page_title),
            body = body,
            nav = TAB_NAV_ID,
            script = script,
        )
    }
}

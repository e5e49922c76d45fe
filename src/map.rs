// Leaflet map description
// The map is a plain value: centre, one tile layer and the markers. It is
// turned into a bootstrap script only when the page is emitted.

use serde::Serialize;

use crate::config::MapConfig;
use crate::itinerary::{Itinerary, LatLng};
use crate::markup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub day_index: usize,
    pub title: String,
    pub position: LatLng,
    pub popup_html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub center: LatLng,
    pub zoom: u8,
    pub tile_layer: TileLayer,
    pub markers: Vec<Marker>,
}

impl MapView {
    // Fixed centre and zoom; the view never fits itself to the markers
    pub fn new(config: &MapConfig) -> Self {
        Self {
            center: config.center(),
            zoom: config.zoom,
            tile_layer: TileLayer {
                url_template: config.tile_url_template.clone(),
                attribution: config.attribution.clone(),
                max_zoom: config.max_zoom,
            },
            markers: Vec::new(),
        }
    }

    pub fn plot(&mut self, itinerary: &Itinerary) -> usize {
        let before = self.markers.len();
        for (day_index, place, position) in itinerary.geocoded_places() {
            self.markers.push(Marker {
                day_index,
                title: place.name.clone(),
                position,
                popup_html: markup::popup(place),
            });
        }
        self.markers.len() - before
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Leaflet bootstrap for the given container id.
    pub fn leaflet_script(&self, container_id: &str) -> String {
        let markers = serde_json::to_string(&self.markers).unwrap_or_else(|_| "[]".to_string());
        let tile = serde_json::to_string(&self.tile_layer).unwrap_or_else(|_| "{}".to_string());

        let script = format!(
            r#"(function(){{
  var map = L.map({container}).setView([{lat}, {lng}], {zoom});
  var tile = {tile};
  L.tileLayer(tile.url_template, {{ maxZoom: tile.max_zoom, attribution: tile.attribution }}).addTo(map);
  {markers}.forEach(function(m) {{
    L.marker([m.position.lat, m.position.lng]).addTo(map).bindPopup(m.popup_html);
  }});
}})();"#,
            container = serde_json::to_string(container_id).unwrap_or_else(|_| "\"map\"".to_string()),
            lat = self.center.lat,
            lng = self.center.lng,
            zoom = self.zoom,
            tile = tile,
            markers = markers,
        );
        json_for_script_tag(&script)
    }
}

// Keeps inlined JSON from closing the surrounding <script> element
fn json_for_script_tag(value: &str) -> String {
    value.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itinerary::{Day, Place};

    fn tokyo() -> Itinerary {
        Itinerary {
            days: vec![Day {
                date: "2025-04-01".to_string(),
                title: "Tokyo".to_string(),
                summary: "Arrival".to_string(),
                places: vec![
                    Place {
                        name: "Narita".to_string(),
                        lat: Some(35.77),
                        lng: Some(140.39),
                        ..Default::default()
                    },
                    Place {
                        name: "Shibuya".to_string(),
                        ..Default::default()
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_new_map_uses_fixed_defaults() {
        let map = MapView::new(&MapConfig::default());
        assert_eq!(map.center, LatLng::new(35.68, 139.75));
        assert_eq!(map.zoom, 13);
        assert_eq!(map.tile_layer.max_zoom, 19);
        assert_eq!(map.tile_layer.attribution, "© OpenStreetMap contributors");
        assert_eq!(
            map.tile_layer.url_template,
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"
        );
        assert!(map.markers.is_empty());
    }

    #[test]
    fn test_plot_only_geocoded_places() {
        let mut map = MapView::new(&MapConfig::default());
        assert_eq!(map.plot(&tokyo()), 1);

        let marker = &map.markers[0];
        assert_eq!(marker.title, "Narita");
        assert_eq!(marker.day_index, 0);
        assert!(marker.popup_html.contains("<strong>Narita</strong>"));
        // Centre stays put regardless of markers
        assert_eq!(map.center, LatLng::new(35.68, 139.75));
    }

    #[test]
    fn test_plot_empty_itinerary() {
        let mut map = MapView::new(&MapConfig::default());
        assert_eq!(map.plot(&Itinerary { days: vec![] }), 0);
        assert_eq!(map.marker_count(), 0);
    }

    #[test]
    fn test_leaflet_script() {
        let mut map = MapView::new(&MapConfig::default());
        map.plot(&tokyo());
        let script = map.leaflet_script("map");

        assert!(script.contains(r#"L.map("map").setView([35.68, 139.75], 13)"#));
        assert!(script.contains("openstreetmap"));
        assert!(script.contains("Narita"));
        assert!(!script.contains("Shibuya"));
        // Popup markup is inlined without closing the script element
        assert!(!script.contains("</"));
    }
}

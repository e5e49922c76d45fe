use serde::{Deserialize, Serialize};

use crate::loader::LoadError;

// Data structures for the itinerary JSON document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Itinerary {
    pub days: Vec<Day>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Day {
    pub date: String,
    pub title: String,
    pub summary: String,
    pub places: Vec<Place>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Place {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gmaps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl Itinerary {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        serde_json::from_slice(bytes).map_err(|e| LoadError::Parse(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Every plottable place in document order, tagged with its day index.
    pub fn geocoded_places(&self) -> impl Iterator<Item = (usize, &Place, LatLng)> + '_ {
        self.days.iter().enumerate().flat_map(|(day_index, day)| {
            day.places
                .iter()
                .filter_map(move |place| place.coordinates().map(|pos| (day_index, place, pos)))
        })
    }

    pub fn place_count(&self) -> usize {
        self.days.iter().map(|day| day.places.len()).sum()
    }
}

impl Place {
    // Zero is a real coordinate (equator / prime meridian); only absence or
    // non-finite values disqualify a place from the map.
    pub fn coordinates(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(LatLng::new(lat, lng))
            }
            _ => None,
        }
    }

    pub fn address_or_empty(&self) -> &str {
        self.address.as_deref().unwrap_or("")
    }

    pub fn notes_or_empty(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }

    pub fn gmaps_or_placeholder(&self) -> &str {
        self.gmaps.as_deref().unwrap_or("#")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const TOKYO: &str = r#"{
        "days": [{
            "date": "2025-04-01",
            "title": "Tokyo",
            "summary": "Arrival",
            "places": [
                {"name": "Narita", "lat": 35.77, "lng": 140.39},
                {"name": "Shibuya"}
            ]
        }]
    }"#;

    #[test]
    fn test_parse_sample_document() {
        let itinerary = Itinerary::from_slice(TOKYO.as_bytes()).unwrap();
        assert_eq!(itinerary.days.len(), 1);

        let day = &itinerary.days[0];
        assert_eq!(day.date, "2025-04-01");
        assert_eq!(day.title, "Tokyo");
        assert_eq!(day.places.len(), 2);
        assert_eq!(day.places[1].name, "Shibuya");
        assert_eq!(day.places[1].address, None);
        assert_eq!(itinerary.place_count(), 2);
    }

    #[test]
    fn test_geocoded_places_skips_unplotted() {
        let itinerary = Itinerary::from_slice(TOKYO.as_bytes()).unwrap();
        let plotted: Vec<_> = itinerary.geocoded_places().collect();

        assert_eq!(plotted.len(), 1);
        assert_eq!(plotted[0].0, 0);
        assert_eq!(plotted[0].1.name, "Narita");
        assert_eq!(plotted[0].2, LatLng::new(35.77, 140.39));
    }

    #[test_case(Some(35.0), None => None ; "missing lng")]
    #[test_case(None, Some(139.0) => None ; "missing lat")]
    #[test_case(None, None => None ; "missing both")]
    #[test_case(Some(0.0), Some(-0.12) => Some(LatLng::new(0.0, -0.12)) ; "equator is a real place")]
    #[test_case(Some(51.47), Some(0.0) => Some(LatLng::new(51.47, 0.0)) ; "prime meridian is a real place")]
    #[test_case(Some(f64::NAN), Some(1.0) => None ; "non finite lat")]
    fn test_coordinates(lat: Option<f64>, lng: Option<f64>) -> Option<LatLng> {
        Place {
            name: "somewhere".to_string(),
            lat,
            lng,
            ..Default::default()
        }
        .coordinates()
    }

    #[test]
    fn test_empty_document() {
        let itinerary = Itinerary::from_slice(br#"{"days": []}"#).unwrap();
        assert!(itinerary.is_empty());
        assert_eq!(itinerary.geocoded_places().count(), 0);
    }

    #[test]
    fn test_missing_optional_day_fields_default() {
        let itinerary = Itinerary::from_slice(br#"{"days": [{"date": "2025-04-02"}]}"#).unwrap();
        let day = &itinerary.days[0];
        assert_eq!(day.title, "");
        assert_eq!(day.summary, "");
        assert!(day.places.is_empty());
    }

    #[test]
    fn test_optional_place_fields_render_empty() {
        let place = Place {
            name: "Shibuya".to_string(),
            ..Default::default()
        };
        assert_eq!(place.address_or_empty(), "");
        assert_eq!(place.notes_or_empty(), "");
        assert_eq!(place.gmaps_or_placeholder(), "#");
    }

    #[test_case("{not json" ; "malformed")]
    #[test_case("{}" ; "missing days")]
    #[test_case(r#"{"days": {}}"# ; "days not a list")]
    fn test_parse_errors(input: &str) {
        let err = Itinerary::from_slice(input.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)), "unexpected error: {err:?}");
    }
}

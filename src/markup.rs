// HTML fragments for the itinerary view.
// Everything here is a pure function of the document values; the view
// controller decides where the fragments go.

use std::fmt::Write;

use crate::itinerary::{Day, Place};

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// Only http(s) links are rendered as-is; anything else becomes a dead link
fn safe_href(place: &Place) -> String {
    let href = place.gmaps_or_placeholder().trim();
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        escape_html(href)
    } else {
        "#".to_string()
    }
}

fn maps_link(place: &Place) -> String {
    format!(
        r#"<a class="btn" href="{}" target="_blank" rel="noopener">Google Maps</a>"#,
        safe_href(place)
    )
}

pub fn tab_label(index: usize, day: &Day) -> String {
    format!(
        r#"<span class="tab-day">Day {}</span> <span class="tab-date">{}</span>"#,
        index + 1,
        escape_html(&day.date)
    )
}

fn day_header(day: &Day) -> String {
    format!(
        r#"<h4>{} — {}</h4><div class="small">{}</div>"#,
        escape_html(&day.date),
        escape_html(&day.title),
        escape_html(&day.summary)
    )
}

pub fn place_entry(place: &Place) -> String {
    format!(
        r#"<div class="place"><strong>{}</strong><div class="small">{}</div><div class="small">{}</div>{}</div>"#,
        escape_html(&place.name),
        escape_html(place.address_or_empty()),
        escape_html(place.notes_or_empty()),
        maps_link(place)
    )
}

pub fn day_pane(day: &Day) -> String {
    let mut pane = day_header(day);
    for place in &day.places {
        pane.push_str(&place_entry(place));
    }
    pane
}

/// Flat list of every day, used by the itinerary container beside the tabs.
pub fn day_list(days: &[Day]) -> String {
    let mut list = String::new();
    for day in days {
        let _ = write!(list, r#"<div class="day">{}</div>"#, day_pane(day));
    }
    list
}

pub fn popup(place: &Place) -> String {
    format!(
        r#"<strong>{}</strong><br>{}<br><div class="small">{}</div>{}"#,
        escape_html(&place.name),
        escape_html(place.address_or_empty()),
        escape_html(place.notes_or_empty()),
        maps_link(place)
    )
}

pub fn error_block(message: &str) -> String {
    format!(
        r#"<div class="load-error" style="color:red; padding: 20px; border: 1px solid #ff0000; background: #fff5f5;">
  <h3>Failed to load itinerary</h3>
  <p>Could not load itinerary.json</p>
  <p>Error: {}</p>
  <p>Please check that:</p>
  <ul>
    <li>itinerary.json is in the same folder as this page</li>
    <li>the file is valid JSON</li>
    <li>the page is served over HTTP, not opened from disk</li>
  </ul>
  <p><strong>To fix:</strong></p>
  <ol>
    <li>Start a local web server in the project folder</li>
    <li>Open the page through <code>http://localhost/</code> instead of a file path</li>
  </ol>
</div>"#,
        escape_html(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn narita() -> Place {
        Place {
            name: "Narita".to_string(),
            address: Some("Chiba".to_string()),
            notes: Some("Terminal 1".to_string()),
            gmaps: Some("https://maps.google.com/?q=narita".to_string()),
            lat: Some(35.77),
            lng: Some(140.39),
        }
    }

    #[test_case("plain" => "plain")]
    #[test_case("<b>&\"'" => "&lt;b&gt;&amp;&quot;&#39;")]
    #[test_case("東京 — 渋谷" => "東京 — 渋谷" ; "non ascii untouched")]
    fn test_escape_html(raw: &str) -> String {
        escape_html(raw)
    }

    #[test]
    fn test_place_entry_with_all_fields() {
        let html = place_entry(&narita());
        assert!(html.contains("<strong>Narita</strong>"));
        assert!(html.contains(r#"<div class="small">Chiba</div>"#));
        assert!(html.contains(r#"<div class="small">Terminal 1</div>"#));
        assert!(html.contains(r#"href="https://maps.google.com/?q=narita""#));
    }

    #[test]
    fn test_missing_optionals_render_empty() {
        let place = Place {
            name: "Shibuya".to_string(),
            ..Default::default()
        };
        let html = place_entry(&place);
        assert!(html.contains(r#"<div class="small"></div><div class="small"></div>"#));
        assert!(html.contains(r##"href="#""##));
    }

    #[test]
    fn test_unsafe_links_are_neutralised() {
        let place = Place {
            name: "x".to_string(),
            gmaps: Some("javascript:alert(1)".to_string()),
            ..Default::default()
        };
        assert!(popup(&place).contains(r##"href="#""##));
    }

    #[test]
    fn test_popup_matches_pane_fields() {
        let html = popup(&narita());
        assert!(html.starts_with("<strong>Narita</strong><br>Chiba<br>"));
        assert!(html.contains("Terminal 1"));
        assert!(html.contains("Google Maps"));
    }

    #[test]
    fn test_day_pane_lists_places_in_order() {
        let day = Day {
            date: "2025-04-01".to_string(),
            title: "Tokyo".to_string(),
            summary: "Arrival".to_string(),
            places: vec![
                narita(),
                Place {
                    name: "Shibuya".to_string(),
                    ..Default::default()
                },
            ],
        };
        let html = day_pane(&day);
        assert!(html.starts_with("<h4>2025-04-01 — Tokyo</h4>"));
        let narita_at = html.find("Narita").unwrap();
        let shibuya_at = html.find("Shibuya").unwrap();
        assert!(narita_at < shibuya_at);
        assert_eq!(tab_label(0, &day), r#"<span class="tab-day">Day 1</span> <span class="tab-date">2025-04-01</span>"#);
    }

    #[test]
    fn test_day_list_wraps_each_day() {
        let days = vec![Day::default(), Day::default()];
        assert_eq!(day_list(&days).matches(r#"<div class="day">"#).count(), 2);
        assert_eq!(day_list(&[]), "");
    }

    #[test]
    fn test_error_block_escapes_message() {
        let html = error_block("HTTP error! status: 404 <oops>");
        assert!(html.contains("HTTP error! status: 404 &lt;oops&gt;"));
        assert!(html.contains("valid JSON"));
        assert!(html.contains("http://localhost/"));
    }
}

//! Place info tool — geocodes place names through Nominatim and reports
//! their area, bounding box and the tag keys found inside.
//!
//! Areas are computed on the sphere from the boundary polygon Nominatim
//! returns, which is accurate enough to tell the model whether a place is
//! a park or a district. Tag keys come from a best-effort Overpass scan of
//! the tagged nodes in each bounding box.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use naturalmaps_config::{NominatimConfig, OverpassConfig};
use naturalmaps_core::error::ToolError;
use naturalmaps_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::{debug, warn};

/// WGS84 equatorial radius in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

const TOOL_NAME: &str = "get_place_info";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct PlaceInfoTool {
    endpoint: String,
    overpass_endpoint: String,
    client: reqwest::Client,
}

impl PlaceInfoTool {
    pub fn new(nominatim: &NominatimConfig, overpass: &OverpassConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(nominatim.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint: nominatim.endpoint.clone(),
            overpass_endpoint: overpass.endpoint.clone(),
            client,
        }
    }

    /// Tag keys of the tagged nodes inside `bboxes`, most frequent first.
    /// A bounding box whose scan fails contributes nothing.
    async fn tag_keys(&self, bboxes: &[[f64; 4]]) -> Vec<String> {
        let mut elements = Vec::new();
        for bbox in bboxes {
            match self.tagged_nodes(bbox).await {
                Ok(nodes) => elements.extend(nodes),
                Err(e) => warn!(bbox = ?bbox, error = %e, "Tag key scan failed"),
            }
        }
        count_tag_keys(&elements)
    }

    async fn tagged_nodes(&self, bbox: &[f64; 4]) -> Result<Vec<serde_json::Value>, String> {
        let response = self
            .client
            .get(&self.overpass_endpoint)
            .query(&[("data", tagged_nodes_query(bbox).as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("Overpass returned status {}", response.status()));
        }
        let mut body: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        match body.get_mut("elements").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(elements)) => Ok(elements),
            _ => Err("response has no elements".into()),
        }
    }

    async fn geocode(&self, place: &str) -> Result<Option<NominatimPlace>, ToolError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", place),
                ("format", "jsonv2"),
                ("polygon_geojson", "1"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: TOOL_NAME.into(),
                        timeout_secs: REQUEST_TIMEOUT_SECS,
                    }
                } else {
                    execution_failed(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("Nominatim returned status {}", response.status()),
            });
        }

        let mut places: Vec<NominatimPlace> = response.json().await.map_err(execution_failed)?;
        Ok(if places.is_empty() {
            None
        } else {
            Some(places.swap_remove(0))
        })
    }
}

fn execution_failed(e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl Tool for PlaceInfoTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Gets the area, bounding box and common tag keys of places. Requires correctly spelt \
         real places as input. Do not tell the user the area of the place unless it is relevant \
         to the question. Returns a JSON object with `area` (display_name to area), `area_unit` \
         (display_name to unit), `bbox` (display_name to [south, west, north, east]) and \
         `tag_keys` (keys of tagged nodes in the places, most frequent first). \
         Use the tag keys as hints for better Overpass queries. \
         Convert from m² to km² when reporting large areas."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "places": {
                    "type": "string",
                    "description": "A place name or a comma-separated list of place names"
                }
            },
            "required": ["places"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let places = arguments["places"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'places' argument".into()))?;

        let names = split_places(places);
        if names.is_empty() {
            return Err(ToolError::InvalidArguments("No place names given".into()));
        }

        let mut summary = PlaceSummary::default();
        for name in names {
            debug!(place = name, "Geocoding place");
            let Some(place) = self.geocode(name).await? else {
                return Ok(ToolResult::failed(format!(
                    "Nominatim geocoder returned 0 results for {name}"
                )));
            };
            summary.add(place);
        }

        let bboxes: Vec<[f64; 4]> = summary.bbox.values().copied().collect();
        summary.tag_keys = self.tag_keys(&bboxes).await;

        let data = serde_json::to_value(&summary)
            .map_err(|e| execution_failed(format!("serializing summary: {e}")))?;
        Ok(ToolResult::ok(data.to_string()))
    }
}

fn split_places(places: &str) -> Vec<&str> {
    places
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    /// `[min_lat, max_lat, min_lon, max_lon]` as strings
    #[serde(default)]
    boundingbox: Vec<String>,
    #[serde(default)]
    geojson: Option<Geometry>,
}

/// A GeoJSON geometry. Only areal types contribute to the area.
#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

impl Geometry {
    fn area_m2(&self) -> f64 {
        match self.kind.as_str() {
            "Polygon" => serde_json::from_value::<Vec<Vec<[f64; 2]>>>(self.coordinates.clone())
                .map_or(0.0, |rings| polygon_area(&rings)),
            "MultiPolygon" => {
                serde_json::from_value::<Vec<Vec<Vec<[f64; 2]>>>>(self.coordinates.clone())
                    .map_or(0.0, |polygons| polygons.iter().map(|p| polygon_area(p)).sum())
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
struct PlaceSummary {
    area: BTreeMap<String, f64>,
    area_unit: BTreeMap<String, String>,
    bbox: BTreeMap<String, [f64; 4]>,
    tag_keys: Vec<String>,
}

impl PlaceSummary {
    fn add(&mut self, place: NominatimPlace) {
        let area = place.geojson.as_ref().map_or(0.0, Geometry::area_m2);
        self.area.insert(place.display_name.clone(), area.round());
        self.area_unit.insert(place.display_name.clone(), "m²".into());
        if let Some(bbox) = parse_bbox(&place.boundingbox) {
            self.bbox.insert(place.display_name, bbox);
        }
    }
}

/// Reorder Nominatim's `[min_lat, max_lat, min_lon, max_lon]` into
/// `[south, west, north, east]`.
fn parse_bbox(raw: &[String]) -> Option<[f64; 4]> {
    let values: Vec<f64> = raw.iter().filter_map(|v| v.parse().ok()).collect();
    match values.as_slice() {
        [south, north, west, east] => Some([*south, *west, *north, *east]),
        _ => None,
    }
}

/// Overpass QL for every tagged node inside a `[south, west, north, east]` box.
fn tagged_nodes_query(bbox: &[f64; 4]) -> String {
    let [south, west, north, east] = bbox;
    format!("[out:json][timeout:25];node({south},{west},{north},{east})[~\".\"~\".\"];out tags;")
}

/// Distinct tag keys, most frequent first, ties by name. Namespaced keys
/// count under their prefix (`addr:street` is `addr`).
fn count_tag_keys(elements: &[serde_json::Value]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tags in elements.iter().filter_map(|e| e.get("tags")?.as_object()) {
        for key in tags.keys() {
            let prefix = key.split(':').next().unwrap_or(key);
            *counts.entry(prefix).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.into_iter().map(|(key, _)| key.to_string()).collect()
}

/// Outer ring minus holes.
fn polygon_area(rings: &[Vec<[f64; 2]>]) -> f64 {
    let mut rings = rings.iter();
    let Some(outer) = rings.next() else {
        return 0.0;
    };
    let holes: f64 = rings.map(|r| ring_area(r)).sum();
    (ring_area(outer) - holes).max(0.0)
}

/// Area of a closed `[lon, lat]` ring on the sphere, in square metres.
fn ring_area(ring: &[[f64; 2]]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..ring.len() {
        let [lon1, lat1] = ring[i];
        let [lon2, lat2] = ring[(i + 1) % ring.len()];
        total += (lon2 - lon1).to_radians()
            * (2.0 + lat1.to_radians().sin() + lat2.to_radians().sin());
    }
    (total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_places() {
        assert_eq!(
            split_places("Kreuzberg, Berlin , ,Mitte"),
            vec!["Kreuzberg", "Berlin", "Mitte"]
        );
    }

    #[test]
    fn one_degree_square_at_equator() {
        let ring = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];
        let area = ring_area(&ring);
        // About 12,391 km² on a sphere of WGS84 equatorial radius.
        assert!((area / 1e6 - 12_391.0).abs() < 50.0, "got {area}");
    }

    #[test]
    fn winding_order_does_not_matter() {
        let ccw = vec![[13.0, 52.0], [13.1, 52.0], [13.1, 52.1], [13.0, 52.1]];
        let cw: Vec<_> = ccw.iter().rev().copied().collect();
        assert!((ring_area(&ccw) - ring_area(&cw)).abs() < 1e-6);
    }

    #[test]
    fn holes_are_subtracted() {
        let outer = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];
        let hole = vec![[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75], [0.25, 0.25]];
        let solid = polygon_area(std::slice::from_ref(&outer));
        let holed = polygon_area(&[outer, hole]);
        assert!(holed < solid);
        assert!(holed > solid * 0.7);
    }

    #[test]
    fn point_geometry_has_no_area() {
        let geometry: Geometry =
            serde_json::from_value(serde_json::json!({"type": "Point", "coordinates": [13.4, 52.5]}))
                .unwrap();
        assert_eq!(geometry.area_m2(), 0.0);
    }

    #[test]
    fn summary_from_nominatim_record() {
        let place: NominatimPlace = serde_json::from_value(serde_json::json!({
            "display_name": "Görlitzer Park, Berlin",
            "boundingbox": ["52.4937", "52.4993", "13.4300", "13.4420"],
            "geojson": {
                "type": "Polygon",
                "coordinates": [[[13.43, 52.4937], [13.442, 52.4937], [13.442, 52.4993], [13.43, 52.4993], [13.43, 52.4937]]]
            }
        }))
        .unwrap();

        let mut summary = PlaceSummary::default();
        summary.add(place);
        let json = serde_json::to_value(&summary).unwrap();

        let area = json["area"]["Görlitzer Park, Berlin"].as_f64().unwrap();
        assert!(area > 400_000.0 && area < 600_000.0, "got {area}");
        assert_eq!(json["area_unit"]["Görlitzer Park, Berlin"], "m²");
        assert_eq!(
            json["bbox"]["Görlitzer Park, Berlin"],
            serde_json::json!([52.4937, 13.43, 52.4993, 13.442])
        );
        assert_eq!(json["tag_keys"], serde_json::json!([]));
    }

    #[test]
    fn tag_keys_ranked_by_frequency() {
        let elements = vec![
            serde_json::json!({"type": "node", "tags": {"amenity": "bench", "addr:street": "Wiener Str."}}),
            serde_json::json!({"type": "node", "tags": {"amenity": "toilets", "wheelchair": "yes"}}),
            serde_json::json!({"type": "node", "tags": {"addr:housenumber": "1", "amenity": "cafe"}}),
            serde_json::json!({"type": "node", "tags": {"leisure": "playground", "wheelchair": "no"}}),
            serde_json::json!({"type": "node", "id": 7}),
        ];
        assert_eq!(
            count_tag_keys(&elements),
            vec!["amenity", "addr", "wheelchair", "leisure"]
        );
    }

    #[test]
    fn tagged_nodes_query_uses_bbox_order() {
        let query = tagged_nodes_query(&[52.49, 13.43, 52.5, 13.44]);
        assert_eq!(
            query,
            "[out:json][timeout:25];node(52.49,13.43,52.5,13.44)[~\".\"~\".\"];out tags;"
        );
    }

    #[tokio::test]
    async fn unreachable_overpass_leaves_tag_keys_empty() {
        let tool = PlaceInfoTool::new(
            &NominatimConfig::default(),
            &OverpassConfig {
                endpoint: "http://127.0.0.1:9/api/interpreter".into(),
                timeout_secs: 2,
                max_result_chars: 4096,
            },
        );
        let keys = tool.tag_keys(&[[52.49, 13.43, 52.5, 13.44]]).await;
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn tag_keys_from_overpass_response() {
        let body = r#"{"elements":[{"type":"node","id":1,"tags":{"shop":"bakery","name":"Kiezbäcker"}},{"type":"node","id":2,"tags":{"shop":"florist"}}]}"#;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        let tool = PlaceInfoTool::new(
            &NominatimConfig::default(),
            &OverpassConfig {
                endpoint: format!("http://{addr}/api/interpreter"),
                ..OverpassConfig::default()
            },
        );
        let keys = tool.tag_keys(&[[52.49, 13.43, 52.5, 13.44]]).await;
        assert_eq!(keys, vec!["shop", "name"]);
    }

    #[tokio::test]
    async fn missing_places_is_invalid_arguments() {
        let tool = PlaceInfoTool::new(&NominatimConfig::default(), &OverpassConfig::default());
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = tool
            .execute(serde_json::json!({ "places": " , " }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

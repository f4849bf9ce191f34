use crate::gtfs::{RoutePoint, ShapeIndex};
use std::io::{Cursor, Read};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("failed to download GTFS archive: {0}")]
    Download(#[from] reqwest::Error),
    #[error("failed to open GTFS archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read {name}: {source}")]
    Entry {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("{file} is missing required column {column}")]
    MissingColumn {
        file: &'static str,
        column: &'static str,
    },
    #[error("failed to parse {0}: {1}")]
    Csv(&'static str, #[source] csv::Error),
}

/// Download the static GTFS zip and build the shape index from
/// `shapes.txt`, `trips.txt` and `routes.txt`.
pub async fn load_shape_index(url: &str) -> Result<ShapeIndex, GtfsError> {
    tracing::info!(%url, "downloading static GTFS");

    let response = reqwest::get(url).await?;
    let bytes = response.bytes().await?;

    tracing::info!(bytes = bytes.len(), "downloaded GTFS archive, extracting");

    let cursor = Cursor::new(bytes.as_ref());
    let mut archive = zip::ZipArchive::new(cursor)?;

    let shapes_txt = read_entry(&mut archive, "shapes.txt")?;
    let trips_txt = read_entry(&mut archive, "trips.txt")?;
    let routes_txt = read_entry(&mut archive, "routes.txt").ok();

    let mut index = ShapeIndex::default();
    parse_shapes(&shapes_txt, &mut index)?;
    parse_trips(&trips_txt, &mut index)?;
    if let Some(content) = routes_txt {
        parse_routes(&content, &mut index)?;
    }

    Ok(index)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &'static str,
) -> Result<String, GtfsError> {
    let mut file = archive
        .by_name(name)
        .map_err(GtfsError::Archive)?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|source| GtfsError::Entry { name, source })?;
    Ok(content)
}

/// Parse shape polylines, preserving `shape_pt_sequence` order within each
/// shape. Rows with unparseable ids or coordinates are skipped.
pub fn parse_shapes(content: &str, index: &mut ShapeIndex) -> Result<(), GtfsError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| GtfsError::Csv("shapes.txt", e))?
        .clone();
    let shape_id_col = column(&headers, "shapes.txt", "shape_id")?;
    let lat_col = column(&headers, "shapes.txt", "shape_pt_lat")?;
    let lon_col = column(&headers, "shapes.txt", "shape_pt_lon")?;
    let seq_col = column(&headers, "shapes.txt", "shape_pt_sequence")?;

    let mut rows: Vec<(i64, u32, f64, f64)> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| GtfsError::Csv("shapes.txt", e))?;

        let shape_id: i64 = match record.get(shape_id_col).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => continue,
        };
        let lat: f64 = match record.get(lat_col).and_then(|v| v.parse().ok()) {
            Some(lat) => lat,
            None => continue,
        };
        let lon: f64 = match record.get(lon_col).and_then(|v| v.parse().ok()) {
            Some(lon) => lon,
            None => continue,
        };
        let sequence: u32 = record
            .get(seq_col)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        rows.push((shape_id, sequence, lat, lon));
    }

    rows.sort_by_key(|&(shape_id, sequence, _, _)| (shape_id, sequence));
    for (shape_id, _, lat, lon) in rows {
        index.insert_point(shape_id, RoutePoint { lat, lon });
    }

    Ok(())
}

/// Map shapes to routes and pick up trip headsigns.
pub fn parse_trips(content: &str, index: &mut ShapeIndex) -> Result<(), GtfsError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| GtfsError::Csv("trips.txt", e))?
        .clone();
    let route_id_col = column(&headers, "trips.txt", "route_id")?;
    let shape_id_col = column(&headers, "trips.txt", "shape_id")?;
    let headsign_col = headers.iter().position(|h| h == "trip_headsign");

    for result in reader.records() {
        let record = result.map_err(|e| GtfsError::Csv("trips.txt", e))?;

        let route_id: i64 = match record.get(route_id_col).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => continue,
        };
        let shape_id: i64 = match record.get(shape_id_col).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => continue,
        };

        index.map_shape_to_route(shape_id, route_id);

        if let Some(headsign) = headsign_col.and_then(|col| record.get(col)) {
            if !headsign.is_empty() {
                index.set_route_headsign(route_id, headsign.to_string());
            }
        }
    }

    Ok(())
}

/// Pick up route colors. GTFS stores them without the leading `#`.
pub fn parse_routes(content: &str, index: &mut ShapeIndex) -> Result<(), GtfsError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| GtfsError::Csv("routes.txt", e))?
        .clone();
    let route_id_col = column(&headers, "routes.txt", "route_id")?;
    let Some(color_col) = headers.iter().position(|h| h == "route_color") else {
        return Ok(());
    };

    for result in reader.records() {
        let record = result.map_err(|e| GtfsError::Csv("routes.txt", e))?;

        let route_id: i64 = match record.get(route_id_col).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => continue,
        };
        if let Some(color) = record.get(color_col) {
            if !color.is_empty() {
                index.set_route_color(route_id, format!("#{}", color.trim_start_matches('#')));
            }
        }
    }

    Ok(())
}

fn column(
    headers: &csv::StringRecord,
    file: &'static str,
    column: &'static str,
) -> Result<usize, GtfsError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or(GtfsError::MissingColumn { file, column })
}

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::Parser;
use interchange::pattern::merge::open_merged;
use interchange::query::{JourneyPlanner, Place, PlanRequest};
use interchange::street::CrowFlightRouter;
use interchange::timetable::in_memory::InMemoryTimetable;

extern crate interchange;

#[derive(Parser)]
struct PlanArgs {
    /// Serialized timetable graph.
    #[arg(short, long)]
    input: PathBuf,
    /// Build directory holding `merged/`.
    #[arg(short, long)]
    build_dir: PathBuf,
    /// Stop label, or "lat,lng".
    #[arg(long)]
    from: String,
    /// Stop label, or "lat,lng".
    #[arg(long)]
    to: String,
    /// Departure, e.g. 2024-05-06T08:00:00.
    #[arg(long)]
    at: String,
    #[arg(long, default_value_t = 1000.0)]
    max_walk_distance: f64,
}

fn parse_place(raw: &str) -> Place {
    if let Some((lat, lng)) = raw.split_once(',') {
        if let (Ok(lat), Ok(lng)) = (lat.trim().parse(), lng.trim().parse()) {
            return Place::Point { lat, lng };
        }
    }
    Place::Stop(raw.to_string())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = PlanArgs::parse();
    let view = InMemoryTimetable::open(&args.input)?;
    let index = open_merged(&args.build_dir)?;
    let streets = CrowFlightRouter::default();
    let planner = JourneyPlanner::new(&view, &index, &streets)?;

    let request = PlanRequest {
        from: parse_place(&args.from),
        to: parse_place(&args.to),
        date_time: NaiveDateTime::parse_from_str(&args.at, "%Y-%m-%dT%H:%M:%S")?,
        max_walk_distance: args.max_walk_distance,
    };
    let journeys = planner.plan(&request, None)?;
    println!("{}", serde_json::to_string_pretty(&journeys)?);
    Ok(())
}

//! `triad inspect` command

use std::path::Path;

use triad::ops::InspectReport;
use triad::TriadError;

use super::load_project;
use crate::cli::InspectArgs;

pub fn execute(config: Option<&Path>, args: InspectArgs) -> Result<i32, TriadError> {
    let project = load_project(config, args.mode)?;
    let report = InspectReport::new(&project);

    if args.json {
        println!("{}", report.to_json());
    } else {
        print!("{}", report.format());
    }

    Ok(0)
}

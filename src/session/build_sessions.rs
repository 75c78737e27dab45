use std::path::Path;
use std::time::Instant;

use crate::error::{PipelineError, Result};
use crate::mnist::{read_raster, LabelMap};
use crate::session::{input_node_id, input_variables, OutputEncoding, Session, SessionSet};

// Load the rasters listed in an unpacked directory's label map and turn each into a session.
// Sessions come out in file name order. Every raster must share the first raster's dimensions.
pub fn build_sessions(
    output_dir: &Path,
    label_map_name: &str,
    encoding: OutputEncoding,
    max_sessions: Option<usize>,
) -> Result<SessionSet> {
    let now = Instant::now();
    let label_map = LabelMap::load(&output_dir.join(label_map_name))?;
    let limit = max_sessions.unwrap_or(usize::MAX);

    let mut sessions = Vec::with_capacity(label_map.len().min(limit));
    let mut labels = Vec::with_capacity(sessions.capacity());
    let mut dimensions: Option<(u32, u32)> = None;
    for (file_name, label) in label_map.iter().take(limit) {
        let path = output_dir.join(file_name);
        let raster = read_raster(&path)?;

        match dimensions {
            None => dimensions = Some(raster.dimensions()),
            Some(expected) if expected != raster.dimensions() => {
                return Err(PipelineError::DimensionMismatch {
                    path,
                    expected,
                    actual: raster.dimensions(),
                });
            }
            Some(_) => {}
        }

        sessions.push(Session {
            input_variables: input_variables(&raster.pixels),
            expected_output: encoding.expected_output(label),
            timesteps: 1,
        });
        labels.push(label);
    }

    let dimensions = dimensions.unwrap_or((0, 0));
    let input_size = dimensions.0 as usize * dimensions.1 as usize;
    tracing::info!(
        "Built {} sessions of {} inputs from {} [{}ms]",
        sessions.len(),
        input_size,
        output_dir.display(),
        now.elapsed().as_millis()
    );

    Ok(SessionSet {
        sessions,
        labels,
        input_nodes: (0..input_size).map(input_node_id).collect(),
        output_nodes: encoding.output_nodes(),
        dimensions,
    })
}

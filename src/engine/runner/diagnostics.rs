use std::collections::HashMap;
use std::fmt::Write;

use crate::engine::{TaskExecution, TaskGraph, TaskId};

/// Timings collected while running a batch of tasks.
///
/// Returned by [`Runner::run`](crate::Runner::run). Only tasks which were
/// actually executed during the batch have an entry, tasks skipped because
/// they were already complete don't.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Per-task execution metrics, measured from entering the task until it
    /// completed, children included.
    pub execution_times: HashMap<TaskId, TaskExecution>,
}

impl Diagnostics {
    /// Renders the task graph as a Mermaid diagram, color-coded by execution
    /// duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Blue**: Not run in this batch
    pub fn render_mermaid(&self, graph: &TaskGraph) -> String {
        let mut f = String::new();
        writeln!(f, "graph LR").unwrap();

        let times = &self.execution_times;
        let (min_time, max_time) = times
            .values()
            .map(|t| t.duration.as_secs_f64())
            .fold(None, |acc: Option<(f64, f64)>, secs| match acc {
                Some((lo, hi)) => Some((lo.min(secs), hi.max(secs))),
                None => Some((secs, secs)),
            })
            .unwrap_or((0.0, 0.0));

        // All tasks taking the same time would divide by zero.
        let span = if (max_time - min_time).abs() < f64::EPSILON {
            1.0
        } else {
            max_time - min_time
        };

        for id in graph.ids() {
            let node = &graph[id];
            let name = node.ident().replace('"', "\\\"");

            let (label_extra, color_code) = match times.get(&id) {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min_time) / span;
                    (format!("{:.2?}", exec.duration), heat(t))
                }
                None => ("Skipped".to_string(), "#ADD8E6".to_string()),
            };

            writeln!(f, "    {:?}[\"{}\\n{}\"]", id.index(), name, label_extra).unwrap();
            writeln!(f, "    style {:?} fill:{}", id.index(), color_code).unwrap();
        }

        for id in graph.ids() {
            for child in graph[id].children() {
                writeln!(f, "    {:?} --> {:?}", id.index(), child.index()).unwrap();
            }
        }

        f
    }
}

/// Green at 0.0 through yellow at 0.5 to red at 1.0.
fn heat(t: f64) -> String {
    let (r, g) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8)
    };

    format!("#{:02X}{:02X}00", r, g)
}

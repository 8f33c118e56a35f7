#![allow(dead_code, unused_imports)]

pub use bootdag_test_utils::builders;
pub use bootdag_test_utils::recorder::{Event, Recorder};
pub use bootdag_test_utils::{init_tracing, with_timeout};

use bootdag::errors::BootError;

/// Render a bootstrap error the way a caller would see it.
pub fn graph_message(err: BootError) -> String {
    match err {
        BootError::Graph(flawed) => flawed.to_string(),
        other => panic!("expected a graph error, got {other:?}"),
    }
}

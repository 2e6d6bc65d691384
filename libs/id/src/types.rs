//! Generated ID definitions.

use crate::define_id;

// A single schedulable unit of work.
define_id!(JobId, "job");

// One scheduler lifetime, from `run()` to its terminal state.
define_id!(RunId, "run");

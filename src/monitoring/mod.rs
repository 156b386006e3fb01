/*!
 * Monitoring
 * Tracing setup and workload spans
 */

mod tracer;

pub use tracer::{init_tracing, span_workload, WorkloadSpan};

/*!
 * Monitoring
 * Tracing subscriber setup; counters live with the groups (`flight::stats`)
 */

mod tracer;

pub use tracer::init_tracing;

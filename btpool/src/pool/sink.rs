use btpool_api::errors::JobFailure;
use btpool_api::job::ErrorSink;

use crate::log_error;

/// Default error sink: logs each job failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, failure: &JobFailure) {
        log_error!(
            failure,
            job = failure.job(),
            worker = failure.worker(),
            panicked = failure.is_panic(),
            "job failed"
        );
    }
}

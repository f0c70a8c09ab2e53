#[cfg(feature = "telemetry")]
mod common;

#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::sync::Mutex;

    use parz_core::ResultType;
    use parz_core::telemetry::{self, Counter, Histogram};

    use super::common::{compress_paths, decompress_to, mixed_bytes, write_file};

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn records_pipeline_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let dir = tempfile::tempdir()?;
        let input = write_file(dir.path(), "metrics.bin", &mixed_bytes(10_000))?;
        let archive = dir.path().join("metrics.parz");
        assert_eq!(compress_paths(&archive, &[input], 1000, 2)?.result, ResultType::Success);
        assert_eq!(
            decompress_to(&archive, &dir.path().join("out.bin"), 2).result,
            ResultType::Success
        );

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(Counter::ReaderBlocks), 20);
        assert_eq!(snapshot.counter(Counter::WriterBlocks), 20);
        assert_eq!(snapshot.counter(Counter::TransformedBlocks), 20);
        assert_eq!(snapshot.counter(Counter::TransformFailures), 0);
        assert_eq!(snapshot.counter(Counter::Tasks), 2);
        assert_eq!(snapshot.counter(Counter::CanceledTasks), 0);
        // Compressed bytes are written once and read back once.
        assert_eq!(
            snapshot.counter(Counter::ReaderBytes),
            snapshot.counter(Counter::WriterBytes)
        );
        assert!(snapshot.counter(Counter::ReaderBytes) > 10_000);
        assert!(snapshot.counter(Counter::RecordsWritten) >= 3);
        assert!(snapshot.counter(Counter::RecordsValidated) >= 3);
        assert!(
            snapshot
                .histogram(Histogram::TransformLatencyUs)
                .is_some_and(|histogram| histogram.count == 20)
        );
        assert!(
            snapshot
                .histogram(Histogram::TaskLatencyUs)
                .is_some_and(|histogram| histogram.count == 2)
        );
        Ok(())
    }
}

#[cfg(not(feature = "telemetry"))]
#[test]
fn registry_is_empty_without_feature() {
    let snapshot = parz_core::telemetry::snapshot();
    assert!(snapshot.counters.is_empty());
    assert!(snapshot.histograms.is_empty());
}

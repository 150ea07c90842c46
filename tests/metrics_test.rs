mod common;

use chrono::{TimeDelta, TimeZone, Utc};
use common::{IgcFixture, TestPipeline, date, time};
use metrics::{SharedString, Unit};
use metrics_util::CompositeKey;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use towlog::IngestError;
use towlog::delayed::DelayedDownload;
use towlog::file_store::FileStore;

const GLIDER_FILE: &str = "2024-06-01_HB-1234.DD1234.igc";
const SHORT_FILE: &str = "2024-06-02_HB-1234.DD1234.igc";

type Snapshot = Vec<(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)>;

fn counter_value(snapshot: &Snapshot, name: &str, reason: Option<&str>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.key().name() == name)
        .filter(|(key, _, _, _)| {
            reason.is_none_or(|reason| {
                key.key()
                    .labels()
                    .any(|label| label.key() == "reason" && label.value() == reason)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}

#[test]
fn test_ingest_counters_track_outcomes() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let test = TestPipeline::new();
                let log =
                    IgcFixture::tow_climb("HB-1234", date(2024, 6, 1), time(10, 0, 0)).render();

                test.pipeline
                    .upload_and_process(GLIDER_FILE, &log, "LSZF")
                    .await
                    .unwrap();
                let again = test
                    .pipeline
                    .upload_and_process(GLIDER_FILE, &log, "LSZF")
                    .await;
                assert!(matches!(again, Err(IngestError::DuplicateFlight { .. })));

                let short = IgcFixture::with_altitudes(
                    "HB-1234",
                    date(2024, 6, 2),
                    time(10, 0, 0),
                    &[400, 450, 500, 550, 600],
                )
                .render();
                test.files
                    .save("2024/06/02/LSZF/", SHORT_FILE, &short)
                    .await
                    .unwrap();
                let reread = test.pipeline.read_and_process("LSZF", SHORT_FILE).await;
                assert!(matches!(reread, Ok(None)));

                let event_time = Utc.with_ymd_and_hms(2024, 6, 1, 16, 0, 0).unwrap();
                let expired = DelayedDownload::new("LSZF", "DD1234", event_time)
                    .run_at(&test.pipeline, event_time + TimeDelta::hours(25))
                    .await;
                assert!(matches!(expired, Ok(None)));
            });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_value(&snapshot, "ingest.flights_created_total", None),
        1
    );
    assert_eq!(counter_value(&snapshot, "ingest.duplicates_total", None), 1);
    assert_eq!(
        counter_value(
            &snapshot,
            "ingest.abandoned_total",
            Some("insufficient_data")
        ),
        1
    );
    assert_eq!(counter_value(&snapshot, "ingest.abandoned_total", None), 1);
    assert_eq!(
        counter_value(&snapshot, "ingest.retention_expired_total", None),
        1
    );
}

//! End-to-end engine runs against in-memory collaborators.

use chrono::{DateTime, FixedOffset, TimeZone};
use ps_core::{BasalPoint, BasalTimeline, TherapyTimeline, TimeRange};
use ps_sync::{
    DestinationRecord, Entity, Entry, Gateway, GatewayError, SourceError, SyncError,
    TherapySource, process_time_range,
};

const CSV_EXPORT: &str = "\
DeviceType,SerialNumber,Description,EventDateTime,Readings (CGM / BGM)
\"t:slim X2 Insulin Pump\",11111111,EGV,2021-03-16T12:00:00,150
\"t:slim X2 Insulin Pump\",11111111,EGV,2021-03-16T12:05:00,152

Type,EventID,EventDateTime,IOB
IOB,1,2021-03-16T12:00:00,2.13
IOB,2,2021-03-16T12:05:00,1.95

Type,EventID,EventDateTime,BasalRate
Basal,1,2021-03-16T00:00:00,0.8
Basal,2,2021-03-16T00:20:21,0.799
Basal,3,2021-03-16T00:25:21,0.797

Type,Description,RequestDateTime,CompletionDateTime,InsulinDelivered,CarbSize,UserOverride,BolexStartDateTime,BolexCompletionDateTime
Bolus,Standard/Correction,2021-03-16T12:53:36,2021-03-16T12:58:26,13.53,75,0,,
Bolus,Automatic Bolus/Correction,2021-03-16T17:55:00,2021-03-16T18:00:00,1.70,0,0,,
Bolus,Standard,2021-03-16T23:21:58,2021-03-16T23:23:17,1.25,0,1,,
";

fn timeline() -> TherapyTimeline {
    TherapyTimeline {
        basal: BasalTimeline {
            temp_delivery_events: vec![BasalPoint {
                x: 1_615_878_000, // 2021-03-16 00:00:00-04:00
                y: 0.8,
                duration: 1221.0,
            }],
            profile_delivery_events: vec![BasalPoint {
                x: 1_615_879_221, // 00:20:21
                y: 0.799,
                duration: 300.0,
            }],
            algorithm_delivery_events: vec![
                BasalPoint {
                    x: 1_615_879_521, // 00:25:21
                    y: 0.797,
                    duration: 300.0,
                },
                BasalPoint {
                    x: 1_615_879_821, // 00:30:21
                    y: 0.0,
                    duration: 2693.0,
                },
            ],
        },
    }
}

struct FakeSource {
    timeline: Option<TherapyTimeline>,
    csv: Option<String>,
}

impl FakeSource {
    fn with_timeline() -> Self {
        Self {
            timeline: Some(timeline()),
            csv: Some(CSV_EXPORT.to_string()),
        }
    }

    fn without_timeline() -> Self {
        Self {
            timeline: None,
            csv: Some(CSV_EXPORT.to_string()),
        }
    }
}

impl TherapySource for FakeSource {
    fn therapy_timeline(&self, _range: &TimeRange) -> Result<TherapyTimeline, SourceError> {
        self.timeline.clone().ok_or(SourceError::Http {
            status: 404,
            body: "no Control-IQ data".to_string(),
        })
    }

    fn therapy_timeline_csv(&self, _range: &TimeRange) -> Result<String, SourceError> {
        self.csv.clone().ok_or(SourceError::Transport(
            "connection refused".to_string(),
        ))
    }
}

#[derive(Default)]
struct FakeGateway {
    last_basal: Option<DestinationRecord>,
    last_bolus: Option<DestinationRecord>,
    last_iob: Option<DestinationRecord>,
    created: Vec<Entry>,
    updated: Vec<(String, Entry)>,
    deleted: Vec<(Entity, String)>,
}

impl Gateway for FakeGateway {
    fn last_uploaded(&self, event_type: &str) -> Result<Option<DestinationRecord>, GatewayError> {
        Ok(match event_type {
            "Temp Basal" => self.last_basal.clone(),
            "Combo Bolus" => self.last_bolus.clone(),
            other => panic!("unexpected event type query: {other}"),
        })
    }

    fn last_uploaded_activity(
        &self,
        activity_type: &str,
    ) -> Result<Option<DestinationRecord>, GatewayError> {
        assert_eq!(activity_type, "pumpsync IOB");
        Ok(self.last_iob.clone())
    }

    fn create(&mut self, entry: &Entry) -> Result<(), GatewayError> {
        self.created.push(entry.clone());
        Ok(())
    }

    fn update(&mut self, id: &str, entry: &Entry) -> Result<(), GatewayError> {
        self.updated.push((id.to_string(), entry.clone()));
        Ok(())
    }

    fn delete(&mut self, entity: Entity, id: &str) -> Result<(), GatewayError> {
        self.deleted.push((entity, id.to_string()));
        Ok(())
    }
}

fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(4 * 3600)
        .unwrap()
        .with_ymd_and_hms(2021, 3, d, h, m, s)
        .unwrap()
}

fn window() -> TimeRange {
    TimeRange::new(at(16, 0, 0, 0), at(17, 0, 0, 0)).unwrap()
}

fn record(
    created_at: DateTime<FixedOffset>,
    duration: Option<f64>,
    id: Option<&str>,
) -> DestinationRecord {
    DestinationRecord {
        id: id.map(ToString::to_string),
        created_at,
        duration,
        rate: None,
        reason: None,
    }
}

fn created_of<'a>(gateway: &'a FakeGateway, label: &str) -> Vec<&'a Entry> {
    gateway
        .created
        .iter()
        .filter(|e| e.label() == label)
        .collect()
}

#[test]
fn empty_destination_gets_everything_created() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway::default();

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.basal.created, 4);
    assert_eq!(summary.bolus.created, 3);
    assert_eq!(summary.iob.created, 2);
    assert_eq!(summary.basal.updated, 0);
    assert_eq!(summary.readings_seen, 2);
    assert!(gateway.updated.is_empty());
    assert!(gateway.deleted.is_empty());

    let basal = created_of(&gateway, "Temp Basal");
    let times: Vec<&str> = basal.iter().map(|e| e.created_at.as_str()).collect();
    assert_eq!(
        times,
        [
            "2021-03-16 00:00:00-04:00",
            "2021-03-16 00:20:21-04:00",
            "2021-03-16 00:25:21-04:00",
            "2021-03-16 00:30:21-04:00",
        ]
    );
    assert_eq!(basal[0].duration, Some(20.35));
    assert_eq!(basal[0].rate, Some(0.8));
    assert_eq!(basal[0].reason.as_deref(), Some("tempDelivery"));
    assert_eq!(basal[3].rate, Some(0.0));
    assert!((basal[3].duration.unwrap() - 2693.0 / 60.0).abs() < 1e-9);

    let boluses = created_of(&gateway, "Combo Bolus");
    let notes: Vec<&str> = boluses.iter().filter_map(|e| e.notes.as_deref()).collect();
    assert_eq!(
        notes,
        [
            "Standard/Correction",
            "Automatic Bolus/Correction",
            "Standard (Override)",
        ]
    );
    assert_eq!(boluses[0].insulin, Some(13.53));
    assert_eq!(boluses[0].carbs, Some(75.0));
    assert_eq!(boluses[0].created_at, "2021-03-16 12:58:26-04:00");

    let iob = created_of(&gateway, "pumpsync IOB");
    assert_eq!(iob.len(), 2);
    assert_eq!(iob[0].iob, Some(2.13));
    assert_eq!(iob[1].iob, Some(1.95));
}

#[test]
fn partially_synced_window_skips_up_to_last_uploaded() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway {
        last_basal: Some(record(at(16, 0, 20, 21), Some(5.0), Some("id1"))),
        ..FakeGateway::default()
    };

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.basal.created, 2);
    assert_eq!(summary.basal.updated, 0);
    assert_eq!(summary.basal.skipped, 2);
    let basal = created_of(&gateway, "Temp Basal");
    assert_eq!(basal[0].created_at, "2021-03-16 00:25:21-04:00");
    assert_eq!(basal[1].created_at, "2021-03-16 00:30:21-04:00");
}

#[test]
fn grown_tail_segment_updates_in_place() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway {
        last_basal: Some(record(at(16, 0, 20, 21), Some(3.0), Some("nightscout_id"))),
        ..FakeGateway::default()
    };

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.basal.created, 2);
    assert_eq!(summary.basal.updated, 1);
    let (id, entry) = &gateway.updated[0];
    assert_eq!(id, "nightscout_id");
    assert_eq!(entry.created_at, "2021-03-16 00:20:21-04:00");
    assert_eq!(entry.duration, Some(5.0));
    assert_eq!(entry.rate, Some(0.799));
}

#[test]
fn newer_iob_reading_replaces_the_old_record() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway {
        last_iob: Some(record(at(16, 12, 0, 0), None, Some("iob-old"))),
        ..FakeGateway::default()
    };

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.iob.created, 1);
    assert_eq!(summary.iob.skipped, 1);
    let iob = created_of(&gateway, "pumpsync IOB");
    assert_eq!(iob[0].iob, Some(1.95));
    assert_eq!(gateway.deleted, [(Entity::Activity, "iob-old".to_string())]);
}

#[test]
fn up_to_date_iob_record_is_not_deleted() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway {
        last_iob: Some(record(at(16, 12, 5, 0), None, Some("iob-current"))),
        ..FakeGateway::default()
    };

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.iob.created, 0);
    assert_eq!(summary.iob.skipped, 2);
    assert!(gateway.deleted.is_empty());
}

#[test]
fn dry_run_counts_but_never_writes() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway {
        last_iob: Some(record(at(16, 12, 0, 0), None, Some("iob-old"))),
        ..FakeGateway::default()
    };

    let summary = process_time_range(&source, &mut gateway, &window(), true).unwrap();

    assert_eq!(summary.basal.created, 4);
    assert_eq!(summary.bolus.created, 3);
    assert_eq!(summary.iob.created, 1);
    assert!(gateway.created.is_empty());
    assert!(gateway.updated.is_empty());
    assert!(gateway.deleted.is_empty());
}

#[test]
fn rerunning_a_synced_window_is_idempotent() {
    let source = FakeSource::with_timeline();
    let mut gateway = FakeGateway::default();
    process_time_range(&source, &mut gateway, &window(), false).unwrap();

    // Move the recency markers to what the first run wrote, as the
    // destination would report them.
    gateway.last_basal = Some(record(
        at(16, 0, 30, 21),
        Some(2693.0 / 60.0),
        Some("basal-tail"),
    ));
    gateway.last_bolus = Some(record(at(16, 23, 23, 17), None, Some("bolus-last")));
    gateway.last_iob = Some(record(at(16, 12, 5, 0), None, Some("iob-last")));
    let writes_before = gateway.created.len();

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    assert_eq!(summary.written(), 0);
    assert_eq!(gateway.created.len(), writes_before);
    assert!(gateway.updated.is_empty());
    assert!(gateway.deleted.is_empty());
}

#[test]
fn missing_timeline_falls_back_to_csv_basal() {
    let source = FakeSource::without_timeline();
    let mut gateway = FakeGateway::default();

    let summary = process_time_range(&source, &mut gateway, &window(), false).unwrap();

    // Three CSV basal rows; the delivery type is unknown on this path and
    // durations come from row gaps, the last bounded by the window end.
    assert_eq!(summary.basal.created, 3);
    let basal = created_of(&gateway, "Temp Basal");
    assert_eq!(basal[0].created_at, "2021-03-16 00:00:00-04:00");
    assert_eq!(basal[0].duration, Some(20.35));
    assert_eq!(basal[0].reason.as_deref(), Some(""));
    assert!((basal[2].duration.unwrap() - (24.0 * 60.0 - 25.0 - 21.0 / 60.0)).abs() < 1e-9);

    // The rest of the export still syncs normally.
    assert_eq!(summary.bolus.created, 3);
    assert_eq!(summary.iob.created, 2);
}

/// Delegates to an inner fake until a create budget is spent, then
/// refuses further writes.
struct FlakyGateway {
    inner: FakeGateway,
    creates_before_failure: usize,
}

impl Gateway for FlakyGateway {
    fn last_uploaded(&self, event_type: &str) -> Result<Option<DestinationRecord>, GatewayError> {
        self.inner.last_uploaded(event_type)
    }

    fn last_uploaded_activity(
        &self,
        activity_type: &str,
    ) -> Result<Option<DestinationRecord>, GatewayError> {
        self.inner.last_uploaded_activity(activity_type)
    }

    fn create(&mut self, entry: &Entry) -> Result<(), GatewayError> {
        if self.inner.created.len() >= self.creates_before_failure {
            return Err(GatewayError::Http {
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }
        self.inner.create(entry)
    }

    fn update(&mut self, id: &str, entry: &Entry) -> Result<(), GatewayError> {
        self.inner.update(id, entry)
    }

    fn delete(&mut self, entity: Entity, id: &str) -> Result<(), GatewayError> {
        self.inner.delete(entity, id)
    }
}

#[test]
fn gateway_failure_aborts_remaining_writes() {
    let source = FakeSource::with_timeline();
    let mut gateway = FlakyGateway {
        inner: FakeGateway::default(),
        creates_before_failure: 2,
    };

    let err = process_time_range(&source, &mut gateway, &window(), false).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Gateway(GatewayError::Http { status: 500, .. })
    ));

    // The writes issued before the failure stand; nothing after it was
    // attempted.
    assert_eq!(gateway.inner.created.len(), 2);
    assert_eq!(
        gateway.inner.created[0].created_at,
        "2021-03-16 00:00:00-04:00"
    );
    assert_eq!(
        gateway.inner.created[1].created_at,
        "2021-03-16 00:20:21-04:00"
    );
    assert!(gateway.inner.updated.is_empty());
    assert!(gateway.inner.deleted.is_empty());
}

#[test]
fn csv_fetch_failure_is_fatal() {
    let source = FakeSource {
        timeline: Some(timeline()),
        csv: None,
    };
    let mut gateway = FakeGateway::default();

    let err = process_time_range(&source, &mut gateway, &window(), false).unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::Transport(_))));
    assert!(gateway.created.is_empty());
}

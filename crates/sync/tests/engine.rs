use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use ts_storage::schema::{Table, attendee, event};
use ts_storage::{Address, ContentValues, Provider, Record, attendee_from_record};
use ts_sync::{
    EventService, ProfileResolver, RemoteAttendee, RemoteEvent, SyncEngine, SyncError, SyncScope,
};

#[derive(Clone, Default)]
struct FakeService {
    events: Arc<Mutex<Vec<RemoteEvent>>>,
    rosters: Arc<Mutex<HashMap<String, Vec<RemoteAttendee>>>>,
    checkin_replies: Arc<Mutex<HashMap<String, i64>>>,
    failing_codes: Arc<Mutex<HashSet<String>>>,
    posted: Arc<Mutex<Vec<(String, String, bool)>>>,
    event_list_calls: Arc<Mutex<usize>>,
}

impl FakeService {
    fn set_events(&self, events: Vec<RemoteEvent>) {
        *self.events.lock().expect("fake lock") = events;
    }

    fn set_roster(&self, event_id: &str, roster: Vec<RemoteAttendee>) {
        self.rosters
            .lock()
            .expect("fake lock")
            .insert(event_id.to_string(), roster);
    }

    fn reply_with(&self, code: &str, checkin_time: i64) {
        self.checkin_replies
            .lock()
            .expect("fake lock")
            .insert(code.to_string(), checkin_time);
    }

    fn fail_for(&self, code: &str) {
        self.failing_codes
            .lock()
            .expect("fake lock")
            .insert(code.to_string());
    }

    fn posted(&self) -> Vec<(String, String, bool)> {
        self.posted.lock().expect("fake lock").clone()
    }

    fn event_list_calls(&self) -> usize {
        *self.event_list_calls.lock().expect("fake lock")
    }
}

impl EventService for FakeService {
    fn post_checkin(&self, event_id: &str, code: &str, revert: bool) -> Result<i64, SyncError> {
        if self.failing_codes.lock().expect("fake lock").contains(code) {
            return Err(SyncError::Remote("500 Internal Server Error".to_string()));
        }
        self.posted
            .lock()
            .expect("fake lock")
            .push((event_id.to_string(), code.to_string(), revert));
        let replies = self.checkin_replies.lock().expect("fake lock");
        Ok(replies.get(code).copied().unwrap_or(0))
    }

    fn list_events(&self) -> Result<Vec<RemoteEvent>, SyncError> {
        *self.event_list_calls.lock().expect("fake lock") += 1;
        Ok(self.events.lock().expect("fake lock").clone())
    }

    fn list_attendees(&self, event_id: &str) -> Result<Vec<RemoteAttendee>, SyncError> {
        Ok(self
            .rosters
            .lock()
            .expect("fake lock")
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }
}

struct FakeResolver(HashMap<String, String>);

impl ProfileResolver for FakeResolver {
    fn resolve(&self, ids: &[String]) -> Result<HashMap<String, String>, SyncError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.0.get(id).map(|url| (id.clone(), url.clone())))
            .collect())
    }
}

fn remote_event(id: &str) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        name: "DevFest".to_string(),
        place: "Hall 1".to_string(),
        organizer_name: "GDG".to_string(),
        start_time: 1_700_000_000,
        end_time: 1_700_003_600,
    }
}

fn remote_attendee(code: &str, checkin_time: i64) -> RemoteAttendee {
    RemoteAttendee {
        id: code.to_string(),
        name: "Ada".to_string(),
        email: format!("{code}@example.com"),
        plusid: None,
        checkin_time,
    }
}

fn seed_event(provider: &Provider, id: &str) {
    let mut values = ContentValues::new();
    values.put_text(event::ID, id);
    values.put_text(event::NAME, "DevFest");
    values.put_text(event::ORGANIZER_NAME, "GDG");
    values.put_text(event::PLACE, "Hall 1");
    values.put_integer(event::START_TIME, 1_700_000_000);
    values.put_integer(event::END_TIME, 1_700_003_600);
    provider
        .insert(&Address::collection(Table::Event), &values)
        .expect("seed event");
}

fn seed_attendee(
    provider: &Provider,
    event_id: &str,
    code: &str,
    checkin: Option<i64>,
    dirty: bool,
    note: Option<&str>,
) {
    let mut values = ContentValues::new();
    values.put_text(attendee::EVENT_ID, event_id);
    values.put_text(attendee::CODE, code);
    values.put_text(attendee::EMAIL, format!("{code}@example.com"));
    values.put_text(attendee::NAME, "Ada");
    match checkin {
        Some(time) => values.put_integer(attendee::CHECKIN, time),
        None => values.put_null(attendee::CHECKIN),
    }
    values.put_flag(attendee::DIRTY, dirty);
    values.put_opt_text(attendee::NOTE, note);
    provider
        .insert(&Address::collection(Table::Attendee), &values)
        .expect("seed attendee");
}

fn load_attendee(provider: &Provider, event_id: &str, code: &str) -> ts_core::model::Attendee {
    let records = provider
        .query(&Address::attendee(event_id, code), None, None, None)
        .expect("query attendee");
    attendee_from_record(records.first().expect("attendee exists")).expect("row converts")
}

fn all_rows(provider: &Provider, table: Table) -> Vec<Record> {
    provider
        .query(&Address::collection(table), None, None, Some("_id ASC"))
        .expect("query table")
}

#[test]
fn push_applies_the_server_time_and_clears_dirty() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_attendee(&provider, "e1", "c1", Some(123), true, None);
    let service = FakeService::default();
    service.reply_with("c1", 1_700_000_000);

    let report = SyncEngine::new(provider.clone(), service.clone())
        .sync(SyncScope::CheckinsOnly)
        .expect("sync must succeed");

    assert_eq!(report.pushed, 1);
    assert_eq!(service.posted(), vec![("e1".to_string(), "c1".to_string(), false)]);
    let row = load_attendee(&provider, "e1", "c1");
    assert_eq!(row.checkin, Some(1_700_000_000));
    assert!(!row.dirty);
}

#[test]
fn push_of_a_revert_sends_revert_and_accepts_zero() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_attendee(&provider, "e1", "c1", None, true, None);
    let service = FakeService::default();

    let report = SyncEngine::new(provider.clone(), service.clone())
        .sync(SyncScope::CheckinsOnly)
        .expect("sync must succeed");

    assert_eq!(report.pushed, 1);
    assert_eq!(service.posted(), vec![("e1".to_string(), "c1".to_string(), true)]);
    let row = load_attendee(&provider, "e1", "c1");
    assert_eq!(row.checkin, None, "a zero reply reads back as not checked in");
    assert!(!row.dirty);
}

#[test]
fn one_failing_push_does_not_block_its_siblings() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_attendee(&provider, "e1", "c1", Some(123), true, None);
    seed_attendee(&provider, "e1", "c2", Some(456), true, None);
    let service = FakeService::default();
    service.fail_for("c1");
    service.reply_with("c2", 1_700_000_000);

    let report = SyncEngine::new(provider.clone(), service.clone())
        .sync(SyncScope::CheckinsOnly)
        .expect("sync must succeed");

    assert_eq!(report.pushed, 1);
    assert_eq!(report.push_failures, 1);
    let failed = load_attendee(&provider, "e1", "c1");
    assert!(failed.dirty, "failed push must stay dirty for the next run");
    assert_eq!(failed.checkin, Some(123));
    let pushed = load_attendee(&provider, "e1", "c2");
    assert!(!pushed.dirty);
}

#[test]
fn checkins_only_scope_never_pulls() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);

    SyncEngine::new(provider, service.clone())
        .sync(SyncScope::CheckinsOnly)
        .expect("sync must succeed");

    assert_eq!(service.event_list_calls(), 0);
}

#[test]
fn full_pull_upserts_events_and_rosters() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);
    service.set_roster(
        "e1",
        vec![remote_attendee("c1", 0), remote_attendee("c2", 1_700_000_000)],
    );

    let report = SyncEngine::new(provider.clone(), service)
        .sync(SyncScope::Full)
        .expect("sync must succeed");

    assert_eq!(report.events_upserted, 1);
    assert_eq!(report.attendees_upserted, 2);
    assert_eq!(all_rows(&provider, Table::Event).len(), 1);
    let checked_in = load_attendee(&provider, "e1", "c2");
    assert_eq!(checked_in.checkin, Some(1_700_000_000));
    assert!(!checked_in.dirty);
}

#[test]
fn pull_drops_absent_events_with_their_attendees() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_event(&provider, "gone");
    seed_attendee(&provider, "gone", "c9", None, false, None);
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);
    service.set_roster("e1", vec![remote_attendee("c1", 0)]);

    let report = SyncEngine::new(provider.clone(), service)
        .sync(SyncScope::Full)
        .expect("sync must succeed");

    assert_eq!(report.events_deleted, 1);
    let events = all_rows(&provider, Table::Event);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text(event::ID).expect("id"), "e1");
    let attendees = all_rows(&provider, Table::Attendee);
    assert_eq!(attendees.len(), 1);
    assert_eq!(attendees[0].text(attendee::CODE).expect("code"), "c1");
}

#[test]
fn empty_event_list_clears_both_tables() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_event(&provider, "gone");
    seed_attendee(&provider, "gone", "c9", None, false, None);
    let service = FakeService::default();

    SyncEngine::new(provider.clone(), service)
        .sync(SyncScope::Full)
        .expect("sync must succeed");

    assert!(all_rows(&provider, Table::Event).is_empty());
    assert!(all_rows(&provider, Table::Attendee).is_empty());
}

#[test]
fn pull_preserves_notes_and_unpushed_local_checkins() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    seed_event(&provider, "e1");
    // A note on a clean row and an un-pushed check-in on a dirty one.
    seed_attendee(&provider, "e1", "noted", None, false, Some("front row"));
    seed_attendee(&provider, "e1", "pending", Some(1_699_999_999), true, None);
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);
    // Push for "pending" fails this run, so its dirty state must survive the
    // pull that follows.
    service.fail_for("pending");
    service.set_roster(
        "e1",
        vec![remote_attendee("noted", 1_700_000_000), remote_attendee("pending", 0)],
    );

    SyncEngine::new(provider.clone(), service)
        .sync(SyncScope::Full)
        .expect("sync must succeed");

    let noted = load_attendee(&provider, "e1", "noted");
    assert_eq!(noted.note.as_deref(), Some("front row"));
    assert_eq!(noted.checkin, Some(1_700_000_000), "clean rows take the server value");
    assert!(!noted.dirty);

    let pending = load_attendee(&provider, "e1", "pending");
    assert_eq!(pending.checkin, Some(1_699_999_999), "local edit wins until pushed");
    assert!(pending.dirty);
}

#[test]
fn enrichment_patches_image_urls_into_the_same_upsert() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);
    let mut with_profile = remote_attendee("c1", 0);
    with_profile.plusid = Some("109876".to_string());
    // The server sends an empty string when there is no profile.
    let mut without_profile = remote_attendee("c2", 0);
    without_profile.plusid = Some(String::new());
    service.set_roster("e1", vec![with_profile, without_profile]);
    let resolver = FakeResolver(HashMap::from([(
        "109876".to_string(),
        "https://img.example.com/109876".to_string(),
    )]));

    SyncEngine::with_resolver(provider.clone(), service, resolver)
        .sync(SyncScope::Full)
        .expect("sync must succeed");

    let enriched = load_attendee(&provider, "e1", "c1");
    assert_eq!(enriched.plusid.as_deref(), Some("109876"));
    assert_eq!(
        enriched.image_url.as_deref(),
        Some("https://img.example.com/109876")
    );
    let plain = load_attendee(&provider, "e1", "c2");
    assert_eq!(plain.plusid, None, "empty profile ids normalize to null");
    assert_eq!(plain.image_url, None);
}

#[test]
fn repeated_sync_with_no_changes_is_idempotent() {
    let provider = Arc::new(Provider::open_in_memory().expect("store must open"));
    let service = FakeService::default();
    service.set_events(vec![remote_event("e1")]);
    service.set_roster(
        "e1",
        vec![remote_attendee("c1", 1_700_000_000), remote_attendee("c2", 0)],
    );
    let engine = SyncEngine::new(provider.clone(), service);

    engine.sync(SyncScope::Full).expect("first run");
    let events_before: Vec<_> = all_rows(&provider, Table::Event)
        .iter()
        .map(|row| row.text(event::ID).expect("id").to_string())
        .collect();
    let attendees_before: Vec<_> = all_rows(&provider, Table::Attendee)
        .iter()
        .map(|row| attendee_from_record(row).expect("converts"))
        .collect();

    engine.sync(SyncScope::Full).expect("second run");
    let events_after: Vec<_> = all_rows(&provider, Table::Event)
        .iter()
        .map(|row| row.text(event::ID).expect("id").to_string())
        .collect();
    let attendees_after: Vec<_> = all_rows(&provider, Table::Attendee)
        .iter()
        .map(|row| attendee_from_record(row).expect("converts"))
        .collect();

    assert_eq!(events_before, events_after);
    assert_eq!(attendees_before, attendees_after);
}

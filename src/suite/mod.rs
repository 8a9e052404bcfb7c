//! The fixed shard lifecycle script.
//!
//! The cases create a test kind, write a record outside any shard, discover
//! the inserted USB stick's shard, write a record into it, and observe how
//! searches and purges behave as the stick is removed, marked transient, and
//! reinserted. The last cases remove the kind and restore the shard to
//! persistent mode.

use std::io::{self, Write};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::runner::{Case, CaseContext, CommandSource, Proceed, ProceedError, SuiteState};

const PUT_KIND: &str = concat!(
    r#"luna-send -n 1 -a com.palm.contacts luna://com.palm.db/putKind "#,
    r#"'{"id":"com.palm.test:1","owner":"com.palm.contacts","indexes":[{"name":"foo", "props":[{"name":"foo"}]},{"name":"barfoo","props":[{"name":"bar"},{"name":"foo"}]}]}'"#,
);
const PUT_NON_SHARD_RECORD: &str = r#"luna-send -n 1 -a com.palm.contacts luna://com.palm.db/put '{"objects":[{"_kind":"com.palm.test:1","foo":1,"bar":1000}]}'"#;
const LIST_ACTIVE_MEDIA: &str = "luna-send -n 1 luna://com.palm.db/listActiveMedia '{}'";
const SEARCH_ALL_RECORDS: &str = r#"luna-send -n 1 -a com.palm.contacts luna://com.palm.db/search '{"query":{"from":"com.palm.test:1"}}'"#;
const PURGE_RECORDS: &str = r#"date 102012002013 &>/dev/null && luna-send -f -n 1  -a com.palm.spacecadet luna://com.palm.db/purge '{"window":2}'"#;
const SEARCH_AFTER_PURGE: &str = r#"date 112012002013 &>/dev/null && luna-send -n 1 -a com.palm.contacts luna://com.palm.db/search '{"query":{"from":"com.palm.test:1"}}'"#;
const DELETE_KIND: &str = r#"luna-send -n 1 -a com.palm.contacts luna://com.palm.db/delKind '{"id":"com.palm.test:1"}'"#;

const INSERT_STICK: &str = "Please insert USB Stick and press ENTER";
const REMOVE_STICK: &str = "Please remove USB Stick and press ENTER";
const REINSERT_STICK: &str = "Please re-Insert USB Stick and press ENTER";

/// Reply to `listActiveMedia`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ActiveMediaResponse {
    /// Media currently attached to the device.
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

/// One attached medium as reported by `listActiveMedia`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    /// Shard identifier assigned by the database.
    pub shard_id: String,
    /// Device identifier from the storage manager.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Human readable device name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Mount URI of the device.
    #[serde(default)]
    pub device_uri: Option<String>,
}

impl ActiveMediaResponse {
    /// Returns the first medium's shard id.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the reply does not match
    /// the expected shape, lists no media, or carries a shard id that cannot
    /// be embedded in a quoted command.
    pub fn first_shard_id(result: &Value) -> Result<String, String> {
        let response = Self::deserialize(result)
            .map_err(|err| format!("unexpected listActiveMedia reply: {err}"))?;
        let Some(first) = response.media.into_iter().next() else {
            return Err(String::from("listActiveMedia reported no media; is the USB stick inserted?"));
        };
        if !is_embeddable(&first.shard_id) {
            return Err(format!("refusing to embed shard id {:?}", first.shard_id));
        }
        debug!(
            device_id = first.device_id.as_deref().unwrap_or("-"),
            device_name = first.device_name.as_deref().unwrap_or("-"),
            device_uri = first.device_uri.as_deref().unwrap_or("-"),
            "active medium"
        );
        Ok(first.shard_id)
    }
}

fn is_embeddable(shard_id: &str) -> bool {
    !shard_id.is_empty()
        && shard_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '/' | '=' | '_' | '-' | '.'))
}

fn shard_info(state: &SuiteState) -> String {
    format!(
        r#"luna-send -f -n 1  luna://com.palm.db/shardInfo '{{"shardId": "{}"}}'"#,
        state.shard_id_or_empty()
    )
}

fn put_shard_record(state: &SuiteState) -> String {
    format!(
        r#"luna-send -n 1 -a com.palm.contacts luna://com.palm.db/put '{{"shardId":"{}","objects":[{{"_kind":"com.palm.test:1","foo":2,"bar":2000}}]}}'"#,
        state.shard_id_or_empty()
    )
}

fn set_shard_mode(state: &SuiteState, transient: bool) -> String {
    format!(
        r#"luna-send -f -n 1  luna://com.palm.db/setShardMode '{{"shardId": "{}", "transient":{transient}}}'"#,
        state.shard_id_or_empty()
    )
}

fn report_return_value(result: &Value) {
    if let Some(value) = result.get("returnValue") {
        writeln!(io::stdout(), "Return Value: {value}").ok();
    }
}

fn report_and_proceed(ctx: CaseContext<'_>, proceed: Proceed) -> Result<(), ProceedError> {
    report_return_value(ctx.result);
    proceed.signal()
}

fn report_and_hold(
    instruction: &'static str,
) -> impl Fn(CaseContext<'_>, Proceed) -> Result<(), ProceedError> + Send + Sync + 'static {
    move |ctx, proceed| {
        report_return_value(ctx.result);
        ctx.operator.hold(instruction, proceed);
        Ok(())
    }
}

fn capture_shard_id(ctx: CaseContext<'_>, proceed: Proceed) -> Result<(), ProceedError> {
    report_return_value(ctx.result);
    match ActiveMediaResponse::first_shard_id(ctx.result) {
        Ok(shard_id) => {
            writeln!(io::stdout(), "ShardID: {shard_id}").ok();
            info!(case = ctx.id, %shard_id, "discovered shard");
            ctx.state.shard_id = Some(shard_id);
            proceed.signal()
        }
        Err(reason) => proceed.abandon(reason),
    }
}

/// Builds the fourteen shard lifecycle cases in execution order.
#[must_use]
pub fn shard_lifecycle_cases() -> Vec<Case> {
    vec![
        Case::new(
            "PutKind",
            CommandSource::literal(PUT_KIND),
            report_and_proceed,
        ),
        Case::new(
            "PutNonShardRecord",
            CommandSource::literal(PUT_NON_SHARD_RECORD),
            report_and_hold(INSERT_STICK),
        ),
        Case::new(
            "ListActiveMedia",
            CommandSource::literal(LIST_ACTIVE_MEDIA),
            capture_shard_id,
        ),
        Case::new(
            "ShardInfo",
            CommandSource::deferred(shard_info),
            report_and_proceed,
        ),
        Case::new(
            "PutShardRecord",
            CommandSource::deferred(put_shard_record),
            report_and_proceed,
        ),
        Case::new(
            "SearchAllRecords",
            CommandSource::literal(SEARCH_ALL_RECORDS),
            report_and_hold(REMOVE_STICK),
        ),
        Case::new(
            "ShardInfo",
            CommandSource::deferred(shard_info),
            report_and_proceed,
        ),
        Case::new(
            "SearchAllRecords",
            CommandSource::literal(SEARCH_ALL_RECORDS),
            report_and_proceed,
        ),
        Case::new(
            "SetShardTransient",
            CommandSource::deferred(|state| set_shard_mode(state, true)),
            report_and_proceed,
        ),
        Case::new(
            "ShardInfo",
            CommandSource::deferred(shard_info),
            report_and_proceed,
        ),
        Case::new(
            "PurgeRecords",
            CommandSource::literal(PURGE_RECORDS),
            report_and_hold(REINSERT_STICK),
        ),
        Case::new(
            "SearchAllRecords",
            CommandSource::literal(SEARCH_AFTER_PURGE),
            report_and_proceed,
        ),
        Case::new(
            "DeleteKind",
            CommandSource::literal(DELETE_KIND),
            report_and_proceed,
        ),
        Case::new(
            "SetShardPersistent",
            CommandSource::deferred(|state| set_shard_mode(state, false)),
            |_ctx, proceed| proceed.signal(),
        ),
    ]
}

/// Placeholder shown in place of the shard id when listing cases.
pub const SHARD_ID_PLACEHOLDER: &str = "<shardId>";

/// Renders each case as `(id, name, command)` without running anything.
///
/// Deferred commands are rendered with [`SHARD_ID_PLACEHOLDER`].
#[must_use]
pub fn describe(cases: &[Case]) -> Vec<(usize, String, String)> {
    let preview = SuiteState {
        shard_id: Some(SHARD_ID_PLACEHOLDER.to_owned()),
    };
    cases
        .iter()
        .enumerate()
        .map(|(index, case)| {
            (
                index + 1,
                case.name().to_owned(),
                case.command().resolve(&preview),
            )
        })
        .collect()
}

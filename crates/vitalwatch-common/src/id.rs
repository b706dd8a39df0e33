use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initializes the Snowflake id generator.
///
/// `machine_id` and `node_id` must both be in `0..=31`.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Returns the next Snowflake id as a decimal string.
///
/// Batches, telemetry rows and dispatch log entries all take their
/// surrogate ids from here.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

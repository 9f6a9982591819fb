use crate::counter::{OutcomeWindow, WindowCount};
use crate::errors::CacheError;
use crate::remote::RemoteStore;
use crate::utils::num::{i64_to_u64_saturating_nonnegative, u128_to_u64_saturating};
use parking_lot::Mutex;
use std::time::Duration;

// INCRBY creates a missing key at `amount` with no TTL, so the expiry is only
// attached when PTTL reports none. Existing windows keep their original expiry.
const INCR_WINDOW_SCRIPT: &str = r"
local v = redis.call('INCRBY', KEYS[1], ARGV[1])
if v < 0 then
  redis.call('SET', KEYS[1], 0, 'KEEPTTL')
  v = 0
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  ttl = tonumber(ARGV[2])
end
return {v, ttl}
";

// Both fields sit in one hash so they share the expiry set when the hash is created.
const INCR_OUTCOME_SCRIPT: &str = r"
local r = redis.call('HINCRBY', KEYS[1], 'requests', ARGV[1])
local e = redis.call('HINCRBY', KEYS[1], 'errors', ARGV[2])
if r < 0 then
  redis.call('HSET', KEYS[1], 'requests', 0)
  r = 0
end
if e < 0 then
  redis.call('HSET', KEYS[1], 'errors', 0)
  e = 0
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[3])
  ttl = tonumber(ARGV[3])
end
return {r, e, ttl}
";

fn unavailable(e: &redis::RedisError) -> CacheError {
    CacheError::RemoteUnavailable(e.to_string())
}

fn age_from_pttl(window: Duration, pttl_ms: i64) -> Duration {
    let window_ms = u128_to_u64_saturating(window.as_millis());
    Duration::from_millis(window_ms.saturating_sub(i64_to_u64_saturating_nonnegative(pttl_ms)))
}

/// Redis-backed remote store. Connections are pooled and every socket read and
/// write is bounded by the configured timeout.
pub struct RedisRemoteStore {
    client: redis::Client,
    idle: Mutex<Vec<redis::Connection>>,
    max_idle: usize,
    timeout: Duration,
    incr_window: redis::Script,
    incr_outcome: redis::Script,
}

impl RedisRemoteStore {
    pub fn open(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| unavailable(&e))?;
        Ok(Self {
            client,
            idle: Mutex::new(Vec::new()),
            max_idle: 8,
            timeout,
            incr_window: redis::Script::new(INCR_WINDOW_SCRIPT),
            incr_outcome: redis::Script::new(INCR_OUTCOME_SCRIPT),
        })
    }

    fn checkout(&self) -> Result<redis::Connection, CacheError> {
        if let Some(con) = self.idle.lock().pop() {
            return Ok(con);
        }
        let con = self.client.get_connection_with_timeout(self.timeout).map_err(|e| unavailable(&e))?;
        con.set_read_timeout(Some(self.timeout)).map_err(|e| unavailable(&e))?;
        con.set_write_timeout(Some(self.timeout)).map_err(|e| unavailable(&e))?;
        Ok(con)
    }

    fn checkin(&self, con: redis::Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(con);
        }
    }

    /// Runs `f` on a pooled connection. Connections that saw an error are dropped.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, CacheError> {
        let mut con = self.checkout()?;
        match f(&mut con) {
            Ok(v) => {
                self.checkin(con);
                Ok(v)
            }
            Err(e) => {
                log::warn!(target: "tierlite::remote", "redis command failed: {e}");
                Err(unavailable(&e))
            }
        }
    }
}

impl RemoteStore for RedisRemoteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.with_conn(|con| redis::cmd("GET").arg(key).query::<Option<Vec<u8>>>(con))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = u128_to_u64_saturating(ttl.as_millis()).max(1);
        self.with_conn(|con| redis::cmd("SET").arg(key).arg(value).arg("PX").arg(ttl_ms).query::<()>(con))
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed: i64 = self.with_conn(|con| redis::cmd("DEL").arg(key).query(con))?;
        Ok(removed > 0)
    }

    fn incr_window(
        &self,
        key: &str,
        window: Duration,
        amount: i64,
    ) -> Result<WindowCount, CacheError> {
        let window_ms = u128_to_u64_saturating(window.as_millis()).max(1);
        let (count, pttl): (i64, i64) = self.with_conn(|con| {
            self.incr_window.key(key).arg(amount).arg(window_ms).invoke(con)
        })?;
        Ok(WindowCount::new(count, age_from_pttl(window, pttl)))
    }

    fn read_counter(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<Option<WindowCount>, CacheError> {
        let (value, pttl): (Option<i64>, i64) = self.with_conn(|con| {
            redis::pipe().atomic().cmd("GET").arg(key).cmd("PTTL").arg(key).query(con)
        })?;
        Ok(value.map(|v| WindowCount::new(v, age_from_pttl(window, pttl))))
    }

    fn incr_outcome(
        &self,
        key: &str,
        window: Duration,
        requests: i64,
        errors: i64,
    ) -> Result<OutcomeWindow, CacheError> {
        let window_ms = u128_to_u64_saturating(window.as_millis()).max(1);
        let (r, e, pttl): (i64, i64, i64) = self.with_conn(|con| {
            self.incr_outcome.key(key).arg(requests).arg(errors).arg(window_ms).invoke(con)
        })?;
        Ok(OutcomeWindow::new(r, e, age_from_pttl(window, pttl)))
    }

    fn read_outcome(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<Option<OutcomeWindow>, CacheError> {
        let ((r, e), pttl): ((Option<i64>, Option<i64>), i64) = self.with_conn(|con| {
            redis::pipe()
                .atomic()
                .cmd("HMGET")
                .arg(key)
                .arg("requests")
                .arg("errors")
                .cmd("PTTL")
                .arg(key)
                .query(con)
        })?;
        Ok(r.map(|r| OutcomeWindow::new(r, e.unwrap_or(0), age_from_pttl(window, pttl))))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

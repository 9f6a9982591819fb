use crate::config::TierliteConfig;
use crate::counter::AtomicWindowCounter;
use crate::degrade::{DegradeConfig, DegradeController};
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::remote::RemoteStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

pub enum Command {
    CheckConfig { path: Option<PathBuf> },
    SimulateLimit { key_class: String, permits_per_second: u64, burst: u64, calls: u32, permits: u32 },
    SimulateDegrade { key_class: String, min_requests: u64, threshold: f64, requests: u64, failures: u64 },
}

pub fn run(
    config: &TierliteConfig,
    store: Arc<dyn RemoteStore>,
    cmd: Command,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let prefix = config.remote.key_prefix.as_str();
    match cmd {
        Command::CheckConfig { path } => {
            let cfg = match path {
                Some(p) => TierliteConfig::load_file(&p)?,
                None => config.clone(),
            };
            writeln!(
                out,
                "ok cache_types={} rate_limit_classes={} degrade_classes={} remote={}",
                cfg.cache.len(),
                cfg.rate_limit.len(),
                cfg.degrade.len(),
                cfg.remote.url.as_deref().unwrap_or("memory")
            )?;
            Ok(())
        }
        Command::SimulateLimit { key_class, permits_per_second, burst, calls, permits } => {
            let limiter = RateLimiter::new(AtomicWindowCounter::new(store), prefix);
            limiter.update_config(
                &key_class,
                RateLimitConfig { permits_per_second, burst_size: burst, enabled: true },
            )?;
            let allowed = (0..calls).filter(|_| limiter.try_acquire(&key_class, permits)).count();
            let stats = limiter.stats(&key_class);
            writeln!(
                out,
                "key_class={key_class} calls={calls} allowed={allowed} rejected={} reject_rate={:.1}% remote_failures={}",
                stats.rejections,
                stats.reject_rate(),
                stats.remote_failures
            )?;
            Ok(())
        }
        Command::SimulateDegrade { key_class, min_requests, threshold, requests, failures } => {
            let degrade = DegradeController::new(AtomicWindowCounter::new(store), prefix);
            degrade.update_config(
                &key_class,
                DegradeConfig {
                    error_rate_threshold_percent: threshold,
                    min_request_count: min_requests,
                    ..DegradeConfig::default()
                },
            )?;
            for i in 0..requests {
                degrade.record_outcome(&key_class, i >= failures)?;
            }
            let stats = degrade.stats(&key_class);
            writeln!(
                out,
                "key_class={key_class} requests={} errors={} error_rate={:.1}% degraded={}",
                stats.requests,
                stats.errors,
                stats.error_rate(),
                degrade.is_degrade_allowed(&key_class)
            )?;
            Ok(())
        }
    }
}

use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::Settings;
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub token_service: Arc<dyn TokenService>,
    purger_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let signing_key = std::env::var("JWT_SIGNING_KEY")
            .map_err(|_| anyhow::anyhow!("JWT_SIGNING_KEY must be set"))?
            .into_bytes();
        let refresh_id_key = std::env::var("REFRESH_ID_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|_| signing_key.clone());

        let mut pool = None;
        let ledger: Arc<dyn SessionLedger> = match settings.ledger.backend.as_str() {
            "memory" => Arc::new(MemorySessionLedger::new()),
            "mysql" => {
                let p = Pool::<MySql>::connect(&settings.ledger.dsn).await?;
                pool = Some(p.clone());
                Arc::new(MySqlSessionLedger::new(
                    p,
                    Duration::from_millis(settings.ledger.deadline_ms),
                ))
            }
            other => return Err(anyhow::anyhow!("Unknown ledger backend: {}", other)),
        };

        let cache: Arc<dyn FreshnessCache> = match settings.cache.backend.as_str() {
            "memory" => Arc::new(MemoryFreshnessCache::new()),
            "redis" => {
                let redis_client = redis::Client::open(settings.cache.dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisFreshnessCache::new(
                    redis_manager,
                    settings.cache.prefix.clone(),
                    Duration::from_millis(settings.cache.deadline_ms),
                ))
            }
            other => return Err(anyhow::anyhow!("Unknown cache backend: {}", other)),
        };

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            signing_key,
        }));

        let token_service: Arc<dyn TokenService> = Arc::new(RealTokenService::new(
            ledger,
            cache.clone(),
            token_codec,
            RefreshIdDeriver::new(&refresh_id_key)?,
            RotationConfig {
                access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
                grace_period: Duration::from_secs(settings.auth.grace_period_secs),
                session_limit_per_user: settings.auth.session_limit_per_user,
            },
        ));

        let cancel = CancellationToken::new();
        let purger = FreshnessPurger::new(
            cache,
            Duration::from_secs(settings.cache.purge_interval_secs.max(1)),
            cancel.clone(),
        );
        let purger_handle = tokio::spawn(async move {
            purger.run().await;
        });

        info!(
            ledger = %settings.ledger.backend,
            cache = %settings.cache.backend,
            "server started"
        );

        Ok(Self {
            token_service,
            purger_handle: Mutex::new(Some(purger_handle)),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.purger_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("purger handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

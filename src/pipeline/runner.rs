//! The main loop: drain results, refill slots, validate, reset.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::{OrphanPolicy, PipelineConfig};
use super::generation::Supervisor;
use super::source::password_source;
use super::stats::{PipelineStats, StatsSnapshot};
use super::worker::DecryptionResult;
use crate::api::{Register, RemoteService, Validate};
use crate::decrypt::DecrypterFactory;
use crate::error::PipelineError;

/// A registered session driving the worker pool against the remote service.
pub struct DecryptionPipeline {
    remote: Arc<dyn RemoteService>,
    token: String,
    supervisor: Supervisor,
    orphan_policy: OrphanPolicy,
    stats: Arc<PipelineStats>,
}

impl DecryptionPipeline {
    /// Register with `remote` under the configured identity and build a
    /// pipeline for the issued token.
    ///
    /// # Arguments
    ///
    /// * `remote` - Password service
    /// * `factory` - Creates one decrypter per pool slot at every reset
    /// * `config` - Pipeline configuration
    /// * `shutdown` - Process scope; every generation is cancelled with it
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` for an invalid configuration and
    /// `PipelineError::Remote` if registration fails.
    pub async fn connect(
        remote: Arc<dyn RemoteService>,
        factory: Arc<dyn DecrypterFactory>,
        config: &PipelineConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let token = remote
            .register(Register::new(config.identity.clone()))
            .await?
            .token;
        info!(identity = %config.identity, "Registered with password service");

        Self::with_token(remote, token, factory, config, shutdown)
    }

    /// Build a pipeline for an already issued session token.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` for an invalid configuration.
    pub fn with_token(
        remote: Arc<dyn RemoteService>,
        token: impl Into<String>,
        factory: Arc<dyn DecrypterFactory>,
        config: &PipelineConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let token = token.into();
        let stats = Arc::new(PipelineStats::new());
        let source = password_source(Arc::clone(&remote), token.clone());
        let supervisor = Supervisor::new(
            source,
            factory,
            config.pool_size,
            shutdown.child_token(),
            Arc::clone(&stats),
        );

        Ok(Self {
            remote,
            token,
            supervisor,
            orphan_policy: config.orphan_policy,
            stats,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Live counters, readable while the pipeline runs.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` is cancelled or a remote call fails.
    ///
    /// The live generation is cancelled on the way out either way.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Remote` when fetching or validating a password
    /// fails, and `PipelineError::InputClosed` if the input ends.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<StatsSnapshot, PipelineError> {
        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping pipeline");
                Ok(())
            }
            result = self.drive() => result,
        };

        let leftover = self.supervisor.cancel().await;
        if !leftover.is_empty() {
            debug!(count = leftover.len(), "Discarding unvalidated results on shutdown");
            self.stats.record_orphans(leftover.len(), false);
        }

        outcome?;
        let snapshot = self.stats.snapshot();
        info!(
            generations = snapshot.generations,
            validated = snapshot.validated,
            transform_failures = snapshot.transform_failures,
            requeued = snapshot.requeued,
            "Pipeline stopped"
        );
        Ok(snapshot)
    }

    async fn drive(&mut self) -> Result<(), PipelineError> {
        self.reset().await?;

        loop {
            // Ends once a failing worker closes the generation's channel and
            // every buffered result has been read.
            while let Some(result) = self.supervisor.next_result().await {
                self.supervisor.refill(&result).await?;
                self.validate(&result).await?;
            }

            self.reset().await?;
        }
    }

    async fn reset(&mut self) -> Result<(), PipelineError> {
        let orphans = self.supervisor.reset().await?;
        self.settle_orphans(orphans).await?;

        let snapshot = self.stats.snapshot();
        debug!(
            generations = snapshot.generations,
            validated = snapshot.validated,
            transform_failures = snapshot.transform_failures,
            requeued = snapshot.requeued,
            rejected = snapshot.rejected,
            orphans_recovered = snapshot.orphans_recovered,
            orphans_dropped = snapshot.orphans_dropped,
            "Pipeline stats"
        );
        Ok(())
    }

    async fn settle_orphans(&mut self, orphans: Vec<DecryptionResult>) -> Result<(), PipelineError> {
        if orphans.is_empty() {
            return Ok(());
        }

        match self.orphan_policy {
            OrphanPolicy::Validate => {
                self.stats.record_orphans(orphans.len(), true);
                for orphan in &orphans {
                    self.validate(orphan).await?;
                }
            }
            OrphanPolicy::Drop => {
                debug!(count = orphans.len(), "Dropping orphaned results");
                self.stats.record_orphans(orphans.len(), false);
            }
        }
        Ok(())
    }

    async fn validate(&mut self, result: &DecryptionResult) -> Result<(), PipelineError> {
        self.remote
            .validate(Validate::new(
                self.token.clone(),
                result.input.clone(),
                result.output.clone(),
            ))
            .await?;
        self.stats.record_validated();

        debug!(
            generation = %result.generation,
            slot = result.slot,
            decrypter = result.decrypter.id(),
            "Password validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PasswordRequest, PasswordResponse, RegisterResponse};
    use crate::decrypt::{Decrypter, XorDecrypter, XorDecrypterFactory};
    use crate::error::ApiError;
    use crate::pipeline::generation::GenerationId;
    use async_trait::async_trait;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const KEY: u8 = 0x2c;

    /// Serves a scripted list, then an endless supply of unique passwords.
    struct MockRemote {
        scripted: Mutex<VecDeque<String>>,
        fillers: AtomicUsize,
        registered: Mutex<Vec<String>>,
        validated: Mutex<Vec<(String, String)>>,
        reject_validation: bool,
    }

    impl MockRemote {
        fn new(plaintexts: &[&str]) -> Self {
            let cipher = XorDecrypter::new("mock", KEY);
            Self {
                scripted: Mutex::new(plaintexts.iter().map(|p| cipher.encrypt(p)).collect()),
                fillers: AtomicUsize::new(0),
                registered: Mutex::new(Vec::new()),
                validated: Mutex::new(Vec::new()),
                reject_validation: false,
            }
        }

        fn validated(&self) -> Vec<(String, String)> {
            self.validated.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl RemoteService for MockRemote {
        async fn register(&self, request: Register) -> Result<RegisterResponse, ApiError> {
            self.registered
                .lock()
                .expect("lock poisoned")
                .push(request.name);
            Ok(RegisterResponse {
                token: "session-1".to_string(),
            })
        }

        async fn request_password(
            &self,
            request: PasswordRequest,
        ) -> Result<PasswordResponse, ApiError> {
            assert_eq!(request.token, "session-1");
            tokio::time::sleep(Duration::from_millis(1)).await;

            let scripted = self.scripted.lock().expect("lock poisoned").pop_front();
            let encrypted_password = scripted.unwrap_or_else(|| {
                let n = self.fillers.fetch_add(1, Ordering::SeqCst);
                XorDecrypter::new("mock", KEY).encrypt(&format!("filler-{n}"))
            });
            Ok(PasswordResponse { encrypted_password })
        }

        async fn validate(&self, request: Validate) -> Result<(), ApiError> {
            if self.reject_validation {
                return Err(ApiError::Status {
                    code: 500,
                    message: "validator down".to_string(),
                });
            }
            self.validated
                .lock()
                .expect("lock poisoned")
                .push((request.encrypted_password, request.decrypted_password));
            Ok(())
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new()
            .with_identity("tester")
            .with_pool_size(2)
            .with_cipher_key(KEY)
    }

    fn factory() -> Arc<dyn DecrypterFactory> {
        Arc::new(XorDecrypterFactory::new(KEY))
    }

    async fn wait_for_validations(remote: &MockRemote, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while remote.validated().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("validations arrive");
    }

    #[tokio::test]
    async fn test_connect_registers_configured_identity() {
        let remote = Arc::new(MockRemote::new(&[]));
        let shutdown = CancellationToken::new();

        let pipeline = DecryptionPipeline::connect(remote.clone(), factory(), &config(), &shutdown)
            .await
            .expect("connect");

        assert_eq!(pipeline.token(), "session-1");
        assert_eq!(
            remote.registered.lock().expect("lock poisoned").as_slice(),
            ["tester"]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_before_registering() {
        let remote = Arc::new(MockRemote::new(&[]));
        let shutdown = CancellationToken::new();

        let result = DecryptionPipeline::connect(
            remote.clone(),
            factory(),
            &config().with_pool_size(0),
            &shutdown,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Config(_))));
        assert!(remote.registered.lock().expect("lock poisoned").is_empty());
    }

    #[tokio::test]
    async fn test_run_validates_decrypted_passwords_until_shutdown() {
        let remote = Arc::new(MockRemote::new(&["alpha", "bravo", "charlie"]));
        let shutdown = CancellationToken::new();
        let pipeline = DecryptionPipeline::connect(remote.clone(), factory(), &config(), &shutdown)
            .await
            .expect("connect");

        let handle = tokio::spawn(pipeline.run(shutdown.clone()));
        wait_for_validations(&remote, 8).await;
        shutdown.cancel();

        let snapshot = handle.await.expect("run task").expect("clean shutdown");
        assert_eq!(snapshot.generations, 1);
        assert_eq!(snapshot.transform_failures, 0);

        let validated = remote.validated();
        assert!(snapshot.validated >= validated.len() as u64);
        let cipher = XorDecrypter::new("check", KEY);
        for (input, output) in &validated {
            assert_eq!(&cipher.encrypt(output), input);
        }

        let unique: HashSet<_> = validated.iter().map(|(input, _)| input).collect();
        assert_eq!(unique.len(), validated.len());

        let outputs: Vec<_> = validated.iter().map(|(_, output)| output.as_str()).collect();
        for expected in ["alpha", "bravo", "charlie"] {
            assert!(outputs.contains(&expected), "{expected} not validated");
        }
    }

    #[tokio::test]
    async fn test_validation_failure_ends_run() {
        let mut mock = MockRemote::new(&["alpha"]);
        mock.reject_validation = true;
        let remote = Arc::new(mock);
        let shutdown = CancellationToken::new();
        let pipeline =
            DecryptionPipeline::with_token(remote, "session-1", factory(), &config(), &shutdown)
                .expect("valid config");

        let result = tokio::time::timeout(Duration::from_secs(5), pipeline.run(shutdown))
            .await
            .expect("run ends on its own");

        assert!(matches!(
            result,
            Err(PipelineError::Remote(ApiError::Status { code: 500, .. }))
        ));
    }

    #[tokio::test]
    async fn test_with_token_rejects_empty_pool() {
        let remote = Arc::new(MockRemote::new(&[]));

        let result = DecryptionPipeline::with_token(
            remote,
            "session-1",
            factory(),
            &config().with_pool_size(0),
            &CancellationToken::new(),
        );

        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    fn orphan(input: &str, output: &str) -> DecryptionResult {
        let decrypter: Arc<dyn Decrypter> = Arc::new(XorDecrypter::new("orphan", KEY));
        DecryptionResult {
            decrypter,
            slot: 0,
            generation: GenerationId::new(0),
            input: input.to_string(),
            output: output.to_string(),
        }
    }

    #[tokio::test]
    async fn test_orphans_are_validated_by_default() {
        let remote = Arc::new(MockRemote::new(&[]));
        let mut pipeline = DecryptionPipeline::with_token(
            remote.clone(),
            "session-1",
            factory(),
            &config(),
            &CancellationToken::new(),
        )
        .expect("valid config");

        pipeline
            .settle_orphans(vec![orphan("in-1", "out-1"), orphan("in-2", "out-2")])
            .await
            .expect("settle");

        assert_eq!(remote.validated().len(), 2);
        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.orphans_recovered, 2);
        assert_eq!(snapshot.validated, 2);
    }

    #[tokio::test]
    async fn test_orphans_are_discarded_with_drop_policy() {
        let remote = Arc::new(MockRemote::new(&[]));
        let mut pipeline = DecryptionPipeline::with_token(
            remote.clone(),
            "session-1",
            factory(),
            &config().with_orphan_policy(OrphanPolicy::Drop),
            &CancellationToken::new(),
        )
        .expect("valid config");

        pipeline
            .settle_orphans(vec![orphan("in-1", "out-1")])
            .await
            .expect("settle");

        assert!(remote.validated().is_empty());
        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.orphans_dropped, 1);
        assert_eq!(snapshot.validated, 0);
    }
}

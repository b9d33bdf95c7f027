use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::{BackoffPolicy, FarmConfig},
    domain::{ClaimOutcome, Credential, FarmWindow},
    ports::GameApi,
    Result,
};

/// How long the loop should pause after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pause {
    /// Re-derive state immediately (something just changed server-side).
    None,
    /// Short error/refusal backoff.
    Short,
    /// Regular poll interval while waiting or idling.
    Poll,
}

/// The farm lifecycle state machine: start → wait → claim → restart.
///
/// Every tick re-derives the state from a fresh profile snapshot; nothing is
/// trusted across iterations. `farm_reward == 0` means no farm is running.
pub struct FarmCycle {
    name: String,
    api: Arc<dyn GameApi>,
    farm: FarmConfig,
    backoff: BackoffPolicy,
}

impl FarmCycle {
    pub fn new(
        name: String,
        api: Arc<dyn GameApi>,
        farm: FarmConfig,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            name,
            api,
            farm,
            backoff,
        }
    }

    /// Drive the cycle until cancelled or a fatal error unwinds the run.
    pub async fn run(&self, cred: &Credential, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            let pause = match self.tick(cred).await {
                Ok(pause) => pause,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(account = %self.name, error = %e, "farm iteration failed");
                    Pause::Short
                }
            };

            let delay = match pause {
                Pause::None => continue,
                Pause::Short => self.backoff.error_pause,
                Pause::Poll => self.farm.poll_interval,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        Ok(())
    }

    /// One iteration of the state machine. Performs no sleeping itself; the
    /// returned `Pause` tells the loop how long to wait.
    pub async fn tick(&self, cred: &Credential) -> Result<Pause> {
        let profile = self.api.profile(cred).await?;

        if !self.farm.enabled {
            return Ok(Pause::Poll);
        }

        if profile.farm_reward == 0 {
            return if self.start_farm(cred).await? {
                Ok(Pause::None)
            } else {
                Ok(Pause::Short)
            };
        }

        let Some(started_at) = profile.farm_started_at else {
            warn!(account = %self.name, "farm is running but profile carries no start timestamp");
            return Ok(Pause::Poll);
        };

        let window = FarmWindow::after_start(started_at);
        let now = Utc::now();

        if !window.is_mature(now) {
            info!(
                account = %self.name,
                balance = profile.balance,
                hours_left = window.hours_remaining(now),
                "farm not mature yet"
            );
            return Ok(Pause::Poll);
        }

        match self.api.claim_farm(cred).await? {
            ClaimOutcome::Claimed => {
                info!(
                    account = %self.name,
                    reward = profile.farm_reward,
                    balance = profile.balance,
                    "claimed farm reward"
                );
                self.start_farm(cred).await?;
                Ok(Pause::None)
            }
            ClaimOutcome::Refused(reason) => {
                info!(account = %self.name, %reason, "farm claim refused");
                Ok(Pause::Short)
            }
            ClaimOutcome::Unexpected => {
                warn!(account = %self.name, "unexpected farm claim response");
                Ok(Pause::Short)
            }
        }
    }

    /// Start a new farm and report the early reward from a fresh snapshot.
    async fn start_farm(&self, cred: &Credential) -> Result<bool> {
        if !self.api.start_farm(cred).await? {
            warn!(account = %self.name, "farm start was not accepted");
            return Ok(false);
        }
        let fresh = self.api.profile(cred).await?;
        info!(
            account = %self.name,
            early_reward = fresh.farm_reward,
            "started farm"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::{domain::ProfileSnapshot, errors::Error, Result};

    /// Mock API with a scripted profile and claim answer, recording the
    /// order of operations.
    struct ScriptedApi {
        profile: Mutex<ProfileSnapshot>,
        claim: ClaimOutcome,
        start_accepted: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedApi {
        fn new(profile: ProfileSnapshot, claim: ClaimOutcome) -> Self {
            Self {
                profile: Mutex::new(profile),
                claim,
                start_accepted: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GameApi for ScriptedApi {
        async fn profile(&self, _cred: &Credential) -> Result<ProfileSnapshot> {
            self.calls.lock().unwrap().push("profile");
            Ok(self.profile.lock().unwrap().clone())
        }

        async fn start_farm(&self, _cred: &Credential) -> Result<bool> {
            self.calls.lock().unwrap().push("startFarm");
            // Once started, the server reports a fresh running farm.
            if self.start_accepted {
                let mut profile = self.profile.lock().unwrap();
                profile.farm_reward = 1;
                profile.farm_started_at = Some(Utc::now());
            }
            Ok(self.start_accepted)
        }

        async fn claim_farm(&self, _cred: &Credential) -> Result<ClaimOutcome> {
            self.calls.lock().unwrap().push("claimFarm");
            Ok(self.claim.clone())
        }

        async fn start_task(&self, _cred: &Credential, _task_id: &str) -> Result<bool> {
            unreachable!()
        }

        async fn check_task(&self, _cred: &Credential, _task_id: &str) -> Result<bool> {
            unreachable!()
        }

        async fn claim_task(&self, _cred: &Credential, _task_id: &str) -> Result<bool> {
            unreachable!()
        }

        async fn probe_ip(&self) -> Result<String> {
            unreachable!()
        }
    }

    fn profile(farm_reward: i64, started_hours_ago: Option<i64>) -> ProfileSnapshot {
        ProfileSnapshot {
            available_taps: 100,
            farm_reward,
            balance: 1000,
            farm_started_at: started_hours_ago.map(|h| Utc::now() - Duration::hours(h)),
        }
    }

    fn cred() -> Credential {
        Credential {
            account_id: 42,
            auth_data: "auth".into(),
        }
    }

    fn cycle(api: Arc<ScriptedApi>, enabled: bool) -> FarmCycle {
        FarmCycle::new(
            "test".into(),
            api,
            FarmConfig {
                enabled,
                ..Default::default()
            },
            Default::default(),
        )
    }

    #[tokio::test]
    async fn idle_profile_starts_farm_once_and_never_claims() {
        let api = Arc::new(ScriptedApi::new(profile(0, None), ClaimOutcome::Claimed));
        let pause = cycle(api.clone(), true).tick(&cred()).await.unwrap();

        assert_eq!(api.calls(), vec!["profile", "startFarm", "profile"]);
        assert_eq!(pause, Pause::None);
    }

    #[tokio::test]
    async fn refused_start_takes_the_short_backoff() {
        let mut api = ScriptedApi::new(profile(0, None), ClaimOutcome::Claimed);
        api.start_accepted = false;
        let api = Arc::new(api);
        let pause = cycle(api.clone(), true).tick(&cred()).await.unwrap();

        assert_eq!(api.calls(), vec!["profile", "startFarm"]);
        assert_eq!(pause, Pause::Short);
    }

    #[tokio::test]
    async fn running_farm_waits_without_claiming() {
        let api = Arc::new(ScriptedApi::new(profile(12, Some(1)), ClaimOutcome::Claimed));
        let pause = cycle(api.clone(), true).tick(&cred()).await.unwrap();

        assert_eq!(api.calls(), vec!["profile"]);
        assert_eq!(pause, Pause::Poll);
    }

    #[tokio::test]
    async fn matured_farm_is_claimed_then_restarted() {
        let api = Arc::new(ScriptedApi::new(profile(12, Some(5)), ClaimOutcome::Claimed));
        let pause = cycle(api.clone(), true).tick(&cred()).await.unwrap();

        assert_eq!(
            api.calls(),
            vec!["profile", "claimFarm", "startFarm", "profile"]
        );
        assert_eq!(pause, Pause::None);
    }

    #[tokio::test]
    async fn refused_claim_backs_off_without_restarting() {
        let api = Arc::new(ScriptedApi::new(
            profile(12, Some(5)),
            ClaimOutcome::Refused("too early".into()),
        ));
        let pause = cycle(api.clone(), true).tick(&cred()).await.unwrap();

        assert_eq!(api.calls(), vec!["profile", "claimFarm"]);
        assert_eq!(pause, Pause::Short);
    }

    #[tokio::test]
    async fn disabled_farming_only_polls_the_profile() {
        let api = Arc::new(ScriptedApi::new(profile(0, None), ClaimOutcome::Claimed));
        let pause = cycle(api.clone(), false).tick(&cred()).await.unwrap();

        assert_eq!(api.calls(), vec!["profile"]);
        assert_eq!(pause, Pause::Poll);
    }

    #[tokio::test]
    async fn soft_profile_error_propagates_to_the_loop() {
        struct FailingApi;

        #[async_trait]
        impl GameApi for FailingApi {
            async fn profile(&self, _cred: &Credential) -> Result<ProfileSnapshot> {
                Err(Error::Http("timeout".into()))
            }
            async fn start_farm(&self, _cred: &Credential) -> Result<bool> {
                unreachable!()
            }
            async fn claim_farm(&self, _cred: &Credential) -> Result<ClaimOutcome> {
                unreachable!()
            }
            async fn start_task(&self, _cred: &Credential, _t: &str) -> Result<bool> {
                unreachable!()
            }
            async fn check_task(&self, _cred: &Credential, _t: &str) -> Result<bool> {
                unreachable!()
            }
            async fn claim_task(&self, _cred: &Credential, _t: &str) -> Result<bool> {
                unreachable!()
            }
            async fn probe_ip(&self) -> Result<String> {
                unreachable!()
            }
        }

        let cycle = FarmCycle::new(
            "test".into(),
            Arc::new(FailingApi),
            Default::default(),
            Default::default(),
        );
        let err = cycle.tick(&cred()).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}

use std::fmt;
use std::time::Duration;

use kuchiki::NodeRef;
use log::{debug, info};

use crate::error::{Result, ThesisError};
use crate::math::{CompletionHook, MathCleanup, MathEngine, MathJaxConfig, postprocess_math};
use crate::paginator::{BookSetup, Paginator, ProgressProbe, wait_for_settlement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    MathLoading,
    MathDone,
    Paginating,
    Settled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::MathLoading => "math-loading",
            Stage::MathDone => "math-done",
            Stage::Paginating => "paginating",
            Stage::Settled => "settled",
        };
        f.write_str(name)
    }
}

/// Single-pass driver: math engine, math clean-up, paginator. A failure
/// leaves the sequencer in the stage where it happened.
#[derive(Debug)]
pub struct Sequencer {
    stage: Stage,
    math_timeout: Duration,
}

impl Sequencer {
    pub fn new(math_timeout: Duration) -> Self {
        Self {
            stage: Stage::Start,
            math_timeout,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn expect_stage(&self, expected: Stage, action: &'static str) -> Result<()> {
        if self.stage != expected {
            return Err(ThesisError::OutOfOrder {
                action,
                stage: self.stage.to_string(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: Stage) {
        debug!("sequencer: {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// START → MATH_LOADING → MATH_DONE → PAGINATING.
    pub async fn run<M, P>(
        &mut self,
        document: &NodeRef,
        math_config: &MathJaxConfig,
        setup: BookSetup,
        math: &mut M,
        paginator: &mut P,
    ) -> Result<MathCleanup>
    where
        M: MathEngine + ?Sized,
        P: Paginator + ?Sized,
    {
        self.expect_stage(Stage::Start, "load math")?;
        let (hook, completion) = CompletionHook::channel();
        math.load(document, math_config, hook)?;
        self.advance(Stage::MathLoading);

        match tokio::time::timeout(self.math_timeout, completion).await {
            Err(_) => return Err(ThesisError::MathTimeout(self.math_timeout)),
            Ok(Err(_)) => return Err(ThesisError::MathEngineAborted),
            Ok(Ok(Err(reason))) => return Err(ThesisError::MathEngine(reason)),
            Ok(Ok(Ok(()))) => {}
        }
        self.advance(Stage::MathDone);
        let cleanup = postprocess_math(document);

        info!("paginating {} with {} rules", setup.content, setup.rules.len());
        paginator.make_book(document, setup)?;
        self.advance(Stage::Paginating);
        Ok(cleanup)
    }

    /// PAGINATING → SETTLED, observed through `probe`.
    pub async fn settle<Q: ProgressProbe + ?Sized>(
        &mut self,
        probe: &Q,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Duration> {
        self.expect_stage(Stage::Paginating, "settle")?;
        let elapsed = wait_for_settlement(probe, poll_interval, timeout).await?;
        self.advance(Stage::Settled);
        Ok(elapsed)
    }
}

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::error::{Result, ThesisError};
use crate::paginator::{ProgressProbe, wait_for_settlement};

/// Single value that survives a page reload.
pub trait ScrollSlot {
    fn store(&self, value: &str) -> Result<()>;
    fn load(&self) -> Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryScrollSlot {
    value: RefCell<Option<String>>,
}

impl ScrollSlot for MemoryScrollSlot {
    fn store(&self, value: &str) -> Result<()> {
        *self.value.borrow_mut() = Some(value.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>> {
        Ok(self.value.borrow().clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileScrollSlot {
    path: PathBuf,
}

impl FileScrollSlot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ScrollSlot for FileScrollSlot {
    fn store(&self, value: &str) -> Result<()> {
        std::fs::write(&self.path, value)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

pub trait Viewport {
    fn scroll_offset(&self) -> u64;
    fn scroll_to(&mut self, offset: u64);
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollSettings {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub timeout: Duration,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ScrollSettings {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ThesisError::InvalidConfiguration(
                "scroll poll interval must be non-zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ThesisError::InvalidConfiguration(
                "settlement timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Called on unload.
pub fn save_scroll_position<S: ScrollSlot + ?Sized>(slot: &S, viewport: &dyn Viewport) -> Result<()> {
    let offset = viewport.scroll_offset();
    debug!("saving scroll offset {offset}");
    slot.store(&offset.to_string())
}

/// Only a plain non-negative integer counts as a stored offset.
pub fn stored_offset(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Waits for pagination to settle, lets layout calm down for
/// `settle_delay`, then scrolls back to the stored offset. Returns the
/// offset restored, if any.
pub async fn restore_scroll_position<P, S>(
    probe: &P,
    slot: &S,
    viewport: &mut dyn Viewport,
    settings: ScrollSettings,
) -> Result<Option<u64>>
where
    P: ProgressProbe + ?Sized,
    S: ScrollSlot + ?Sized,
{
    wait_for_settlement(probe, settings.poll_interval, settings.timeout).await?;
    restore_settled_scroll_position(slot, viewport, settings.settle_delay).await
}

/// Restore step for a paginator already known to have settled.
pub async fn restore_settled_scroll_position<S: ScrollSlot + ?Sized>(
    slot: &S,
    viewport: &mut dyn Viewport,
    settle_delay: Duration,
) -> Result<Option<u64>> {
    let Some(offset) = slot.load()?.as_deref().and_then(stored_offset) else {
        debug!("no stored scroll offset");
        return Ok(None);
    };
    tokio::time::sleep(settle_delay).await;
    viewport.scroll_to(offset);
    debug!("restored scroll offset {offset}");
    Ok(Some(offset))
}

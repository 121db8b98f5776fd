use std::path::Path;

use ampc_core::{Bounds, StepRecord, Trajectory};
use anyhow::{anyhow, Result};

use crate::{LogHeader, TrajectoryLogFile};

/// Step-by-step cursor over a recorded closed-loop run.
pub struct TrajectoryPlayback {
    header: Option<LogHeader>,
    /// Guaranteed to be non-empty.
    records: Vec<StepRecord>,
    /// Guaranteed to be in bounds.
    current_index: usize,
}

impl TrajectoryPlayback {
    /// Read a trajectory log and position the cursor on its first step.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_log(TrajectoryLogFile::open(path)?)
    }

    /// Fails if the log holds no steps; check [`TrajectoryLogFile::records`] first when
    /// header-only logs are expected.
    pub fn from_log(log: TrajectoryLogFile) -> Result<Self> {
        let header = log.header().cloned();
        let mut playback = Self::from_records(log.take_records())?;
        playback.header = header;
        Ok(playback)
    }

    pub fn from_trajectory(trajectory: Trajectory) -> Result<Self> {
        Self::from_records(trajectory.into_records())
    }

    fn from_records(records: Vec<StepRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(anyhow!("No steps in trajectory"));
        }
        Ok(Self {
            header: None,
            records,
            current_index: 0,
        })
    }

    pub fn header(&self) -> Option<&LogHeader> {
        self.header.as_ref()
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.header.as_ref().map(|h| &h.bounds)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get the current step
    pub fn current(&self) -> &StepRecord {
        &self.records[self.current_index]
    }

    /// Advance to the next step, if there is one
    pub fn next(&mut self) -> Option<&StepRecord> {
        if self.current_index + 1 < self.records.len() {
            self.current_index += 1;
            Some(&self.records[self.current_index])
        } else {
            None
        }
    }

    /// Go back to the previous step, if there is one
    pub fn previous(&mut self) -> Option<&StepRecord> {
        if self.current_index > 0 {
            self.current_index -= 1;
            Some(&self.records[self.current_index])
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    /// Jump to the first record at or after `step`, or the last one.
    pub fn jump_to(&mut self, step: usize) -> &StepRecord {
        self.current_index = self
            .records
            .iter()
            .position(|r| r.step >= step)
            .unwrap_or(self.records.len() - 1);
        self.current()
    }

    pub fn into_trajectory(self) -> Trajectory {
        let mut trajectory = Trajectory::with_capacity(self.records.len());
        for record in self.records {
            trajectory.push(record);
        }
        trajectory
    }
}

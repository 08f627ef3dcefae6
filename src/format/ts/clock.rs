//! PCR bookkeeping: wrap-around correction, bootstrap probes and PCR seeking.

use super::parser::{extract_pcr, pid_of};
use super::sync::read_packet;
use super::types::*;
use super::TsDemuxer;
use crate::av::EsOut;
use crate::error::Result;
use crate::format::ByteSource;
use log::debug;

/// Number of coarse `(offset, pcr)` samples taken across the stream at open.
pub const PCR_SAMPLES: usize = 10;

/// Added once per PCR wrap.
pub const WRAP_UNIT: i64 = PCR_MASK;

/// Half width of the window a seek accepts, in milliseconds.
const SEEK_TOLERANCE_MS: i64 = 500;

/// Packets before the end of the stream where the last PCR probe starts.
const LAST_PCR_BACKOFF: i64 = 4500;

const MIN_BITRATE: i64 = 500_000;
const MAX_BITRATE: i64 = 55_000_000;

/// Program clock state used for position, time and seeking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockState {
    /// PID whose PCRs drive position and seeking
    pub ref_pid: Option<u16>,
    /// First PCR of the reference PID, probed at open
    pub first_pcr: Option<i64>,
    /// Last PCR of the reference PID, probed near the end
    pub last_pcr: Option<i64>,
    /// Latest wrap-adjusted PCR of the reference PID
    pub current_pcr: Option<i64>,
    /// `(byte offset, raw pcr)` samples in stream order
    pub samples: Vec<(u64, i64)>,
    /// Seek and report position by byte percentage
    pub force_percent: bool,
}

impl ClockState {
    /// Empty clock; `force_percent` disables PCR based positioning.
    pub fn new(force_percent: bool) -> Self {
        Self {
            force_percent,
            ..Default::default()
        }
    }

    /// Adds one wrap unit for each wrap the sample index places before `pos`.
    pub fn adjust_wraparound(&self, pcr: i64, pos: u64) -> i64 {
        if self.samples.is_empty() {
            return pcr;
        }

        let mut adjust = 0;
        let mut i = 1;
        while i < self.samples.len() && self.samples[i].0 <= pos {
            if self.samples[i - 1].1 > self.samples[i].1 {
                adjust += WRAP_UNIT;
            }
            i += 1;
        }
        if self.samples[i - 1].1 > pcr {
            adjust += WRAP_UNIT;
        }
        pcr + adjust
    }

    /// Byte range whose samples enclose `target` (a wrap-adjusted PCR).
    pub fn bracket(&self, target: i64, size: u64) -> (u64, u64) {
        if self.samples.is_empty() {
            return (0, size);
        }

        let mut adjust = 0;
        let mut i = 1;
        while i < self.samples.len() {
            if self.samples[i - 1].1 > self.samples[i].1 {
                adjust += WRAP_UNIT;
            }
            if self.samples[i].1 + adjust > target {
                break;
            }
            i += 1;
        }
        let head = self.samples[i - 1].0;
        let tail = self.samples.get(i).map_or(size, |s| s.0);
        (head, tail)
    }

    /// `current - first`, when the current PCR lies after the first.
    pub fn elapsed(&self) -> Option<i64> {
        let elapsed = self.current_pcr? - self.first_pcr?;
        (elapsed >= 0).then_some(elapsed)
    }

    /// `last - first`, when positive.
    pub fn duration(&self) -> Option<i64> {
        let duration = self.last_pcr? - self.first_pcr?;
        (duration > 0).then_some(duration)
    }
}

fn round_down(pos: i64, packet_size: i64) -> i64 {
    pos - pos % packet_size
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    /// Seeks near `pos` and reads forward to the next PCR of the reference PID.
    ///
    /// The read position is restored when none is found.
    pub(crate) async fn seek_to_pcr(&mut self, pos: u64) -> Result<Option<i64>> {
        let initial = self.source.tell();
        let Some(size) = self.source.size() else {
            return Ok(None);
        };
        let last_pos = size.saturating_sub(self.format.packet_size as u64);
        self.source.seek(pos.min(last_pos)).await?;

        let mut found = None;
        while self.is_alive() {
            let Some(packet) = read_packet(&mut self.source, self.format).await? else {
                break;
            };
            if Some(pid_of(&packet)) == self.clock.ref_pid {
                found = extract_pcr(&packet);
            }
            if found.is_some() || self.source.tell() >= last_pos {
                break;
            }
        }

        match found {
            Some(pcr) => {
                self.clock.current_pcr = Some(pcr);
                Ok(Some(pcr))
            }
            None => {
                self.source.seek(initial).await?;
                Ok(None)
            }
        }
    }

    /// Binary search for the position of `percent` of the PCR range.
    ///
    /// On failure the read position and current PCR are restored and
    /// `Ok(false)` is returned.
    pub(crate) async fn seek_pcr(&mut self, percent: f64) -> Result<bool> {
        let (Some(first), Some(last), Some(size)) =
            (self.clock.first_pcr, self.clock.last_pcr, self.source.size())
        else {
            return Ok(false);
        };
        let initial_pos = self.source.tell();
        let initial_pcr = self.clock.current_pcr;
        let packet_size = self.format.packet_size as i64;

        let target = ((last - first) as f64 * percent) as i64 + first;
        let (head, tail) = self.clock.bracket(target, size);
        debug!("Seek():i_head_pos:{}, i_tail_pos:{}", head, tail);

        let (mut head, mut tail) = (head as i64, tail as i64);
        let mut found = false;
        let mut probes = 0;
        while head <= tail {
            let pos = round_down(head + (tail - head) / 2, packet_size);
            let Some(pcr) = self.seek_to_pcr(pos.max(0) as u64).await? else {
                break;
            };
            let current = self.clock.adjust_wraparound(pcr, self.source.tell());
            self.clock.current_pcr = Some(current);

            let diff_ms = ticks_to_us(current - target) / 1000;
            if diff_ms > SEEK_TOLERANCE_MS {
                tail = pos - packet_size;
            } else if diff_ms < -SEEK_TOLERANCE_MS {
                head = pos + packet_size;
            } else {
                found = true;
                break;
            }
            probes += 1;
        }

        if found {
            debug!("Seek():can find a time position. i_cnt:{}", probes);
        } else {
            debug!("Seek():cannot find a time position. i_cnt:{}", probes);
            self.source.seek(initial_pos).await?;
            self.clock.current_pcr = initial_pcr;
        }
        Ok(found)
    }

    /// Finds the first PCR of the stream and adopts its PID as reference.
    pub(crate) async fn probe_first_pcr(&mut self) -> Result<()> {
        let initial = self.source.tell();
        self.source.seek(0).await?;

        while self.is_alive() {
            let Some(packet) = read_packet(&mut self.source, self.format).await? else {
                break;
            };
            if let Some(pcr) = extract_pcr(&packet) {
                self.clock.ref_pid = Some(pid_of(&packet));
                self.clock.first_pcr = Some(pcr);
                self.clock.current_pcr = Some(pcr);
                break;
            }
        }
        self.source.seek(initial).await?;
        Ok(())
    }

    /// Builds the coarse sample index used for wrap correction and seeking.
    pub(crate) async fn probe_pcr_samples(&mut self) -> Result<()> {
        let initial_pos = self.source.tell();
        let initial_pcr = self.clock.current_pcr;
        let (Some(first), Some(size)) = (self.clock.first_pcr, self.source.size()) else {
            self.clock.force_percent = true;
            return Ok(());
        };
        let packet_size = self.format.packet_size as i64;

        self.clock.samples.clear();
        self.clock.samples.push((initial_pos, first));
        for i in 1..PCR_SAMPLES {
            if !self.is_alive() {
                break;
            }
            let pos = round_down(size as i64 / PCR_SAMPLES as i64 * i as i64, packet_size);
            let Some(pcr) = self.seek_to_pcr(pos as u64).await? else {
                break;
            };
            let prev = self.clock.samples[i - 1].1;
            if prev > pcr {
                debug!(
                    "PCR Wrap Around found between {}% and {}% (pcr:{}(0x{:09x}) pcr:{}(0x{:09x}))",
                    (i - 1) * 100 / PCR_SAMPLES,
                    i * 100 / PCR_SAMPLES,
                    prev,
                    prev,
                    pcr,
                    pcr
                );
            }
            self.clock.samples.push((self.source.tell(), pcr));
        }

        let taken = self.clock.samples.len();
        if taken < PCR_SAMPLES {
            debug!(
                "Force Seek Per Percent: Seeking failed at {}%.",
                taken * 100 / PCR_SAMPLES
            );
            self.clock.force_percent = true;
        }

        self.source.seek(initial_pos).await?;
        self.clock.current_pcr = initial_pcr;
        Ok(())
    }

    /// Scans the tail of the stream for its last PCR, discarding implausible results.
    pub(crate) async fn probe_last_pcr(&mut self) -> Result<()> {
        let initial_pos = self.source.tell();
        let initial_pcr = self.clock.current_pcr;
        let Some(size) = self.source.size() else {
            return Ok(());
        };
        let packet_size = self.format.packet_size as i64;
        let last_pos = size as i64 - packet_size;
        let mut pos = round_down(last_pos - packet_size * LAST_PCR_BACKOFF, packet_size).max(0);

        while self.is_alive() {
            let Some(pcr) = self.seek_to_pcr(pos as u64).await? else {
                break;
            };
            let now = self.source.tell();
            self.clock.last_pcr = Some(self.clock.adjust_wraparound(pcr, now));
            pos = now as i64;
            if pos >= last_pos {
                break;
            }
        }

        if let Some(last) = self.clock.last_pcr {
            let duration_ms = ticks_to_us(last - self.clock.first_pcr.unwrap_or(0)) / 1000;
            let rate = if duration_ms <= 0 {
                0
            } else {
                size as i64 * 1000 * 8 / duration_ms
            };
            if !(MIN_BITRATE..=MAX_BITRATE).contains(&rate) {
                debug!(
                    "calculated bitrate ({}bit/s) is too low or too high. min bitrate ({}bit/s) max bitrate ({}bit/s)",
                    rate, MIN_BITRATE, MAX_BITRATE
                );
                self.clock.last_pcr = None;
            }
        }

        self.source.seek(initial_pos).await?;
        self.clock.current_pcr = initial_pcr;
        Ok(())
    }

    /// Records a PCR seen on `pid` and updates program clocks.
    pub(crate) fn handle_pcr(&mut self, pid: u16, pcr: Option<i64>) {
        if self.pmt_es == 0 {
            return;
        }
        let Some(pcr) = pcr else {
            return;
        };

        if self.clock.ref_pid == Some(pid) {
            let pos = self.source.tell();
            self.clock.current_pcr = Some(self.clock.adjust_wraparound(pcr, pos));
        }

        let pmt_pids = self.programs.pmt_pids().to_vec();
        for pmt_pid in pmt_pids {
            let mut group = None;
            for program in self
                .programs
                .iter_mut()
                .filter(|p| p.pmt_pid == pmt_pid && p.pcr_pid == Some(pid))
            {
                program.pcr_value = Some(pcr);
                group = Some(program.number);
            }
            let Some(group) = group else {
                continue;
            };

            let has_es = self
                .pids
                .iter()
                .any(|p| p.owner == Some(pmt_pid) && p.stream().is_some());
            if self.config.trust_pcr && group > 0 && has_es {
                self.out.set_group_pcr(group, ticks_to_us(pcr));
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn wrapped_clock() -> ClockState {
        ClockState {
            samples: vec![(0, 0x1_FFFF_FF00), (100, 0x1_FFFF_FFFE), (200, 5), (300, 1000)],
            ..Default::default()
        }
    }

    #[test]
    fn test_adjust_wraparound() {
        let clock = wrapped_clock();
        assert_eq!(clock.adjust_wraparound(0x1_FFFF_FFFE, 100), 0x1_FFFF_FFFE);
        assert_eq!(clock.adjust_wraparound(5, 200), 5 + WRAP_UNIT);
        assert_eq!(clock.adjust_wraparound(1000, 300), 1000 + WRAP_UNIT);
        // wrapped between two samples
        assert_eq!(clock.adjust_wraparound(3, 150), 3 + WRAP_UNIT);

        let adjusted: Vec<i64> = clock
            .samples
            .iter()
            .map(|&(pos, pcr)| clock.adjust_wraparound(pcr, pos))
            .collect();
        assert!(adjusted.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ClockState::default().adjust_wraparound(42, 1000), 42);
    }

    #[test]
    fn test_bracket() {
        let clock = ClockState {
            samples: vec![(0, 1000), (1880, 2000), (3760, 3000)],
            ..Default::default()
        };
        assert_eq!(clock.bracket(1500, 5000), (0, 1880));
        assert_eq!(clock.bracket(2500, 5000), (1880, 3760));
        assert_eq!(clock.bracket(9000, 5000), (3760, 5000));
        assert_eq!(wrapped_clock().bracket(WRAP_UNIT + 500, 400), (200, 300));
    }

    #[test]
    fn test_elapsed_and_duration() {
        let mut clock = ClockState::new(false);
        assert_eq!(clock.duration(), None);
        clock.first_pcr = Some(900);
        clock.last_pcr = Some(90_900);
        clock.current_pcr = Some(450);
        assert_eq!(clock.duration(), Some(90_000));
        assert_eq!(clock.elapsed(), None);
        clock.current_pcr = Some(45_900);
        assert_eq!(clock.elapsed(), Some(45_000));
    }

    #[quickcheck]
    fn prop_wrap_adjustment_restores_timeline(back: u32, steps: Vec<u16>) -> bool {
        let mut t = WRAP_UNIT - 1 - (back % 1_000_000) as i64;
        let mut timeline = vec![t];
        for step in steps {
            t += step as i64 + 1;
            timeline.push(t);
        }
        let clock = ClockState {
            samples: timeline
                .iter()
                .enumerate()
                .map(|(i, &t)| (i as u64 * 188, t % WRAP_UNIT))
                .collect(),
            ..Default::default()
        };
        clock
            .samples
            .iter()
            .zip(&timeline)
            .all(|(&(pos, pcr), &t)| clock.adjust_wraparound(pcr, pos) == t)
    }
}

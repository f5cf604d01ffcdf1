//! Interval-by-interval playout of a sync plan.

use crate::common::BYTES_PER_SAMPLE;
use crate::error::Result;
use crate::io::{ByteReader, ByteWriter, SampleSink, SampleStream};
use crate::progress::Tracker;
use crate::resample::{lerp, quantise};
use crate::sync::plan::SyncPlan;
use crate::wav::{Guano, WavHeader};

/// Walks the input samples along the corrected per-interval timebase.
///
/// Sample `k` of interval `i` sits at
/// `boundary(i) + first_sample_gap(i) + k / sample_rate(i)` seconds;
/// past the last interval the cursor extends at the final interval's
/// rate. When the payload runs dry the last value is held, so the tail
/// interpolates flat.
struct InputCursor<'a, 'r> {
    plan: &'a SyncPlan,
    boundaries: &'a [f64],
    stream: SampleStream<'r>,
    interval: usize,
    sample: i64,
    pub previous_value: f64,
    pub previous_time: f64,
    pub next_value: f64,
    pub next_time: f64,
}

impl<'a, 'r> InputCursor<'a, 'r> {
    fn new(
        plan: &'a SyncPlan,
        boundaries: &'a [f64],
        mut stream: SampleStream<'r>,
    ) -> Result<InputCursor<'a, 'r>> {
        let mut interval = 0;
        while interval < plan.intervals.len()
            && plan.intervals[interval].number_of_samples <= 0
        {
            interval += 1;
        }

        let first = &plan.intervals[0];
        let mut previous_value = 0.0;
        let mut previous_time = first.first_sample_gap / 1e6 - 1.0 / first.sample_rate;
        if plan.first_sample_is_before_first_interval {
            // One input sample was measured before the first PPS edge;
            // consume it as the opening interpolation endpoint.
            if let Some(sample) = stream.next_sample()? {
                previous_value = sample as f64;
            }
        }

        let next_value = match stream.next_sample()? {
            Some(sample) => sample as f64,
            None => previous_value,
        };
        let next_time = if interval < plan.intervals.len() {
            boundaries[interval] + plan.intervals[interval].first_sample_gap / 1e6
        } else {
            previous_time + 1.0 / first.sample_rate
        };
        if !plan.first_sample_is_before_first_interval {
            previous_value = next_value;
            previous_time = next_time - 1.0 / first.sample_rate;
        }

        Ok(InputCursor {
            plan,
            boundaries,
            stream,
            interval,
            sample: 0,
            previous_value,
            previous_time,
            next_value,
            next_time,
        })
    }

    fn advance(&mut self) -> Result<()> {
        self.previous_value = self.next_value;
        self.previous_time = self.next_time;

        self.sample += 1;
        let intervals = &self.plan.intervals;
        while self.interval < intervals.len()
            && self.sample >= intervals[self.interval].number_of_samples
        {
            self.sample = 0;
            self.interval += 1;
        }

        if let Some(sample) = self.stream.next_sample()? {
            self.next_value = sample as f64;
        }
        self.next_time = if self.interval < intervals.len() {
            let interval = &intervals[self.interval];
            self.boundaries[self.interval]
                + interval.first_sample_gap / 1e6
                + self.sample as f64 / interval.sample_rate
        } else {
            let last = &intervals[intervals.len() - 1];
            self.previous_time + 1.0 / last.sample_rate
        };
        Ok(())
    }

    /// The interpolated value at `time` seconds, after the cursor has
    /// been advanced far enough that `time <= next_time`.
    fn value_at(&self, time: f64) -> f64 {
        if self.next_time > self.previous_time {
            let position = (time - self.previous_time) / (self.next_time - self.previous_time);
            lerp(self.previous_value, self.next_value, position)
        } else {
            self.next_value
        }
    }
}

/// Streams the corrected recording: header, interpolated payload,
/// preserved GUANO.
pub(crate) fn run(
    reader: &mut ByteReader,
    writer: &mut ByteWriter,
    header: &WavHeader,
    plan: &SyncPlan,
    guano: Option<&Guano>,
    tracker: &mut Tracker<'_, '_>,
) -> Result<()> {
    let mut output_header = header.clone();
    if plan.resampled {
        output_header.update_sample_rate(plan.target_sample_rate);
    }
    output_header.update_sizes(plan.samples_to_write * BYTES_PER_SAMPLE, guano)?;
    output_header.write(writer)?;

    let boundaries: Vec<f64> = plan
        .intervals
        .iter()
        .map(|interval| {
            (interval.cumulative_time_interval - interval.time_interval as u64) as f64
        })
        .collect();
    let elapsed = plan
        .intervals
        .last()
        .map(|interval| interval.cumulative_time_interval)
        .unwrap_or(0);

    let stream = SampleStream::new(reader, header.size() as u64, header.data_size() as u64)?;
    let mut cursor = InputCursor::new(plan, &boundaries, stream)?;
    let mut sink = SampleSink::new(writer);
    let target = plan.target_sample_rate;
    let mut written = 0u64;

    'intervals: for (index, interval) in plan.intervals.iter().enumerate() {
        let outputs = interval.time_interval as u64 * target as u64;
        for step in 0..outputs {
            if written == plan.samples_to_write {
                break 'intervals;
            }
            let time = boundaries[index]
                + step as f64 / outputs as f64 * interval.time_interval as f64;
            while time > cursor.next_time {
                cursor.advance()?;
            }
            sink.push(quantise(cursor.value_at(time)))?;
            written += 1;
            tracker.advance(1);
        }
    }

    // The plan only covers the span between PPS events; whatever input
    // remains plays out through a virtual interval at the final rate.
    let mut time = elapsed as f64;
    while written < plan.samples_to_write {
        while time > cursor.next_time {
            cursor.advance()?;
        }
        sink.push(quantise(cursor.value_at(time)))?;
        written += 1;
        tracker.advance(1);
        time += 1.0 / target as f64;
    }
    sink.flush()?;

    if let Some(chunk) = guano {
        chunk.write(writer)?;
    }
    writer.finish()
}

//! Partial-discharge frame simulator
//!
//! Publishes synthetic sensor frames to an MQTT topic, or writes them as a
//! capture file for `gis-pd-monitor --replay`. Each frame is one mains cycle:
//! a four-word header, `--samples` ADC counts and a one-word trailer, all
//! 16-bit big-endian.
//!
//! Discharge patterns:
//! - internal: pulse clusters on the rising flanks (~45° and ~225°)
//! - surface: asymmetric clusters, stronger in the positive half-cycle
//! - corona: pulses near the negative peak (~270°) only
//! - noise: background only
//!
//! # Usage
//! ```bash
//! ./pd-simulator --host 127.0.0.1 --topic pub1 --rate 10
//! ./pd-simulator --cycles 500 --out capture.txt
//! ```

use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal, NormalError};
use rumqttc::{Client, MqttOptions, QoS};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use gis_pd_monitor::acquisition::decoder::{
    encode_payload, ADC_FULL_SCALE, ADC_REFERENCE_VOLTS, HEADER_SAMPLES,
};

// ============================================================================
// Signal Constants
// ============================================================================

/// Background level (ADC counts, about 0.03 V)
const NOISE_MEAN: f64 = 40.0;
/// Background spread (ADC counts)
const NOISE_SD: f64 = 8.0;
/// Header word value
const HEADER_WORD: u16 = 0xaa55;
/// Trailer word value
const TRAILER_WORD: u16 = 0x55aa;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pattern {
    Internal,
    Surface,
    Corona,
    Noise,
}

#[derive(Parser, Debug)]
#[command(name = "pd-simulator")]
#[command(about = "Synthetic partial-discharge frames for GIS PD Monitor testing")]
#[command(version)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    port: u16,

    /// Topic to publish on
    #[arg(long, default_value = "pub1")]
    topic: String,

    /// Frames per second
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=1000))]
    rate: u32,

    /// Stop after this many frames (runs until Ctrl+C when omitted)
    #[arg(short, long)]
    cycles: Option<u64>,

    /// Samples per frame, excluding header and trailer
    #[arg(long, default_value = "500", value_parser = clap::value_parser!(u32).range(1..=20000))]
    samples: u32,

    /// Discharge pattern
    #[arg(long, value_enum, default_value = "internal")]
    pattern: Pattern,

    /// Peak pulse amplitude (V)
    #[arg(long, default_value = "1.5")]
    peak_volts: f64,

    /// Write a capture file (one hex frame per line) instead of publishing
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Frame Generation
// ============================================================================

/// A pulse cluster centred on a phase angle.
#[derive(Debug, Clone, Copy)]
struct Cluster {
    phase_deg: f64,
    width_deg: f64,
    /// Fraction of the peak amplitude
    scale: f64,
    /// Pulses per cycle
    rate: f64,
}

impl Pattern {
    fn clusters(self) -> &'static [Cluster] {
        match self {
            Pattern::Internal => &[
                Cluster { phase_deg: 45.0, width_deg: 25.0, scale: 1.0, rate: 6.0 },
                Cluster { phase_deg: 225.0, width_deg: 25.0, scale: 0.9, rate: 6.0 },
            ],
            Pattern::Surface => &[
                Cluster { phase_deg: 60.0, width_deg: 35.0, scale: 1.0, rate: 8.0 },
                Cluster { phase_deg: 240.0, width_deg: 35.0, scale: 0.4, rate: 3.0 },
            ],
            Pattern::Corona => &[
                Cluster { phase_deg: 270.0, width_deg: 12.0, scale: 0.6, rate: 10.0 },
            ],
            Pattern::Noise => &[],
        }
    }
}

struct FrameGenerator {
    rng: StdRng,
    noise: Normal<f64>,
    pattern: Pattern,
    samples: usize,
    peak_counts: f64,
}

impl FrameGenerator {
    fn new(
        pattern: Pattern,
        samples: usize,
        peak_volts: f64,
        seed: Option<u64>,
    ) -> Result<Self, NormalError> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            noise: Normal::new(NOISE_MEAN, NOISE_SD)?,
            pattern,
            samples,
            peak_counts: volts_to_counts(peak_volts),
        })
    }

    /// ADC counts for one cycle (samples only).
    fn cycle_counts(&mut self) -> Vec<u16> {
        let mut counts: Vec<f64> = (0..self.samples)
            .map(|_| self.noise.sample(&mut self.rng).max(0.0))
            .collect();

        for cluster in self.pattern.clusters() {
            let pulses = self.rng.gen_range(0.0..=2.0 * cluster.rate).round() as usize;
            for _ in 0..pulses {
                let phase = cluster.phase_deg
                    + self.rng.gen_range(-cluster.width_deg..=cluster.width_deg);
                let idx = phase_to_index(phase, self.samples);
                let amplitude = self.peak_counts * cluster.scale * self.rng.gen_range(0.2..=1.0);
                counts[idx] = counts[idx].max(amplitude);
            }
        }

        counts
            .into_iter()
            .map(|c| c.round().clamp(0.0, f64::from(u16::MAX)) as u16)
            .collect()
    }

    /// One complete frame: header, samples, trailer.
    fn frame(&mut self) -> Vec<u8> {
        let mut words = vec![HEADER_WORD; HEADER_SAMPLES];
        words.extend(self.cycle_counts());
        words.push(TRAILER_WORD);
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }
}

fn volts_to_counts(volts: f64) -> f64 {
    (volts * ADC_FULL_SCALE / ADC_REFERENCE_VOLTS).clamp(0.0, f64::from(u16::MAX))
}

fn phase_to_index(phase_deg: f64, samples: usize) -> usize {
    let wrapped = phase_deg.rem_euclid(360.0);
    ((wrapped / 360.0 * samples as f64) as usize).min(samples.saturating_sub(1))
}

// ============================================================================
// Output
// ============================================================================

fn log_progress(sent: u64, started: Instant, quiet: bool) {
    if !quiet && sent % 100 == 0 {
        eprintln!("[{:>7.1}s] {} frames", started.elapsed().as_secs_f64(), sent);
    }
}

fn write_capture(args: &Args, path: &PathBuf, generator: &mut FrameGenerator) -> io::Result<()> {
    let total = args.cycles.unwrap_or(1_000);
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    writeln!(
        out,
        "# pd-simulator pattern={:?} samples={} frames={}",
        args.pattern, args.samples, total
    )?;
    for _ in 0..total {
        writeln!(out, "{}", encode_payload(&generator.frame()))?;
    }
    out.flush()?;
    if !args.quiet {
        eprintln!("Wrote {} frames to {}", total, path.display());
    }
    Ok(())
}

fn publish(args: &Args, generator: &mut FrameGenerator) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = MqttOptions::new(
        format!("pd-simulator-{}", std::process::id()),
        args.host.clone(),
        args.port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut connection) = Client::new(options, 64);

    // The sync client needs its event loop driven on another thread.
    let quiet = args.quiet;
    std::thread::spawn(move || {
        for event in connection.iter() {
            if let Err(e) = event {
                if !quiet {
                    eprintln!("MQTT error: {}", e);
                }
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    });

    if !args.quiet {
        eprintln!(
            "Publishing {:?} frames ({} samples) to {}:{} topic '{}' at {} Hz",
            args.pattern, args.samples, args.host, args.port, args.topic, args.rate
        );
    }

    let period = Duration::from_secs_f64(1.0 / f64::from(args.rate));
    let started = Instant::now();
    let mut next = Instant::now();
    let mut sent = 0u64;

    while args.cycles.map_or(true, |limit| sent < limit) {
        client.publish(args.topic.as_str(), QoS::AtLeastOnce, false, generator.frame())?;
        sent += 1;
        log_progress(sent, started, args.quiet);

        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    // Give the event loop a moment to flush outstanding publishes.
    std::thread::sleep(Duration::from_millis(500));
    client.disconnect()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut generator = FrameGenerator::new(
        args.pattern,
        args.samples as usize,
        args.peak_volts,
        args.seed,
    )?;

    match &args.out {
        Some(path) => write_capture(&args, path, &mut generator)?,
        None => publish(&args, &mut generator)?,
    }
    Ok(())
}

//! Defines the command line parameters selecting the stimulation protocol.
use clap::{Parser, Subcommand};
use evoked_common::Real;
use trace_to_responses::Protocol;

/// Parameters of the paired pulse protocol.
#[derive(Default, Debug, Clone, Parser)]
pub(crate) struct PairedPulseParameters {
    /// Time between the first and second stimulus, in milliseconds.
    #[clap(long)]
    pub(crate) interstimulus_ms: Real,
}

/// The stimulation protocol the trace files were recorded under.
#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// A single stimulus ("1AP"), one response window.
    #[clap(name = "single-stimulus")]
    SingleStimulus,
    /// Two stimuli ("PPF"), one response window after each.
    #[clap(name = "paired-pulse")]
    PairedPulse(PairedPulseParameters),
}

impl Mode {
    pub(crate) fn protocol(&self) -> Protocol {
        match self {
            Mode::SingleStimulus => Protocol::SingleStimulus,
            Mode::PairedPulse(parameters) => Protocol::PairedPulse {
                interstimulus_ms: parameters.interstimulus_ms,
            },
        }
    }
}

//! Toy story VM over stdin/stdout.
//! Usage: `replaybox-toy-vm STORY [--seed N]`. Without `--seed` the dice
//! differ between runs.

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
#![allow(clippy::exit)]

use replaybox::channel::{ChannelError, CommandSource, LineSource, SessionChannel, Transcript};
use replaybox::interpreter::{CancelFlag, Interpreter};
use replaybox_fixtures::toy::{Story, ToyVm};
use std::io::{self, Write};

/// Exit status for a runtime fault.
const FAULT_EXIT: i32 = 70;

struct StdioChannel {
    source: LineSource<io::BufReader<io::Stdin>>,
    transcript: Transcript,
}

impl SessionChannel for StdioChannel {
    fn read_command(&mut self) -> Result<Option<String>, ChannelError> {
        self.source.next_command().map_err(ChannelError::Source)
    }

    fn write_output(&mut self, fragment: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(fragment.as_bytes());
        let _ = stdout.flush();
    }

    fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: replaybox-toy-vm STORY [--seed N]");
        std::process::exit(2);
    };
    let mut seed = ToyVm::clock_seed();
    while let Some(arg) = args.next() {
        if arg == "--seed" {
            seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(seed);
        }
    }
    let story = match std::fs::read_to_string(&path) {
        Ok(text) => Story::parse(&text),
        Err(err) => {
            eprintln!("cannot load {path}: {err}");
            std::process::exit(2);
        }
    };

    let mut channel = StdioChannel {
        source: LineSource::new(io::BufReader::new(io::stdin())),
        transcript: Transcript::new(),
    };
    let mut vm = ToyVm::new(story, seed);
    if let Err(fault) = vm.run(&mut channel, &CancelFlag::new()) {
        eprintln!("{fault}");
        std::process::exit(FAULT_EXIT);
    }
}

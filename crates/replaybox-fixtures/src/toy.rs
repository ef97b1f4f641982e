//! A toy story interpreter.
//!
//! Story files are plain text with `key: value` lines:
//!
//! ```text
//! title: Cloak of Darkness
//! serial: 160518
//! on look: You are standing in an empty foyer.
//! on hang up cloak: You hang the cloak on the hook.
//! ```
//!
//! Built-in verbs: `roll` (a die, seeded when deterministic), `crash` (raises
//! a runtime fault), and `quit`. Anything else unknown gets the stock parser
//! complaint.

use replaybox::channel::SessionChannel;
use replaybox::interpreter::{
    CancelFlag, Interpreter, InterpreterFactory, InterpreterFault, InterpreterOptions,
};
use replaybox::provider::ProgramGuard;
use replaybox::runner::RunnerResult;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seed used in deterministic mode.
pub const FIXED_SEED: u64 = 1;

const PROMPT: &str = "\n>";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Story {
    pub title: String,
    pub serial: String,
    pub responses: BTreeMap<String, String>,
}

impl Story {
    pub fn parse(text: &str) -> Self {
        let mut story = Self {
            title: "Untitled".to_string(),
            serial: "000000".to_string(),
            responses: BTreeMap::new(),
        };
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "title" => story.title = value,
                "serial" => story.serial = value,
                key => {
                    if let Some(command) = key.strip_prefix("on ") {
                        story.responses.insert(command.trim().to_lowercase(), value);
                    }
                }
            }
        }
        story
    }

    pub fn banner(&self) -> String {
        format!(
            "{}\nAn interactive fiction\nRelease 1 / Serial number {} / Inform v6.33 Library 6/12N\n{PROMPT}",
            self.title, self.serial
        )
    }
}

/// Small xorshift generator; good enough for dice.
#[derive(Clone, Debug)]
struct Dice(u64);

impl Dice {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn roll(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x % 6 + 1
    }
}

#[derive(Clone, Debug)]
pub struct ToyVm {
    story: Story,
    dice: Dice,
}

impl ToyVm {
    pub fn new(story: Story, seed: u64) -> Self {
        Self {
            story,
            dice: Dice::new(seed),
        }
    }

    /// Seed from the clock; runs differ from one another.
    pub fn clock_seed() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::from(elapsed.subsec_nanos()) ^ elapsed.as_secs())
            .unwrap_or(7)
    }

    fn respond(&mut self, command: &str) -> Result<Option<String>, InterpreterFault> {
        let key = command.trim().to_lowercase();
        let text = match key.as_str() {
            "quit" => return Ok(None),
            "crash" => {
                return Err(InterpreterFault::Runtime(
                    "illegal opcode at $1f3a".to_string(),
                ))
            }
            "roll" => format!("You roll a {}.", self.dice.roll()),
            _ => match self.story.responses.get(&key) {
                Some(text) => text.clone(),
                None => "I don't understand that.".to_string(),
            },
        };
        Ok(Some(text))
    }
}

impl Interpreter for ToyVm {
    fn run(
        &mut self,
        channel: &mut dyn SessionChannel,
        cancel: &CancelFlag,
    ) -> Result<(), InterpreterFault> {
        channel.write_output(&self.story.banner());
        while let Some(command) = channel.read_command()? {
            if cancel.is_cancelled() {
                return Err(InterpreterFault::Cancelled);
            }
            match self.respond(&command)? {
                Some(text) => channel.write_output(&format!("{text}\n{PROMPT}")),
                None => {
                    channel.write_output("Goodbye.\n");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// In-process factory; counts how many interpreters it created.
#[derive(Debug, Default)]
pub struct ToyVmFactory {
    created: std::sync::atomic::AtomicUsize,
}

impl ToyVmFactory {
    pub fn created(&self) -> usize {
        self.created.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl InterpreterFactory for ToyVmFactory {
    fn create(
        &self,
        program: &ProgramGuard,
        options: &InterpreterOptions,
    ) -> RunnerResult<Box<dyn Interpreter>> {
        self.created
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let story = Story::parse(&String::from_utf8_lossy(program.bytes()));
        let seed = if options.deterministic {
            FIXED_SEED
        } else {
            ToyVm::clock_seed()
        };
        Ok(Box::new(ToyVm::new(story, seed)))
    }
}

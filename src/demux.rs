//! Per-topic frame skipping over a single forward pass of a message stream.

use crate::bag::BagMessage;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicState {
    pub seen: u64,
    pub retained: u64,
}

/// A message that survived the skip policy, tagged with its topic-local
/// sequence number (1-based count of messages seen on that topic).
#[derive(Debug, Clone)]
pub struct Retained {
    pub message: BagMessage,
    pub sequence: u64,
}

#[derive(Debug)]
pub struct Demultiplexer {
    interest: HashSet<String>,
    skip: u64,
    states: HashMap<String, TopicState>,
    skipped: u64,
}

impl Demultiplexer {
    /// Keeps every `skip`-th message of each topic in `interest`, starting with
    /// the first.
    pub fn new<I, S>(interest: I, skip: u32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if skip == 0 {
            return Err(Error::InvalidFrameSkip(skip));
        }
        Ok(Demultiplexer {
            interest: interest.into_iter().map(Into::into).collect(),
            skip: u64::from(skip),
            states: HashMap::new(),
            skipped: 0,
        })
    }

    /// Applies the policy to one message. Returns the sequence number if kept.
    pub fn offer(&mut self, topic: &str) -> Option<u64> {
        if !self.interest.contains(topic) {
            return None;
        }
        let state = self.states.entry(topic.to_string()).or_default();
        let keep = state.seen % self.skip == 0;
        state.seen += 1;
        if keep {
            state.retained += 1;
            Some(state.seen)
        } else {
            self.skipped += 1;
            None
        }
    }

    /// Lazily filters `stream`. The first `Err` item is passed through and ends
    /// the iteration.
    pub fn process<'d, I>(&'d mut self, stream: I) -> Demux<'d, I::IntoIter>
    where
        I: IntoIterator<Item = Result<BagMessage>>,
    {
        Demux {
            demux: self,
            stream: stream.into_iter(),
            failed: false,
        }
    }

    pub fn state(&self, topic: &str) -> Option<TopicState> {
        self.states.get(topic).copied()
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn retained(&self) -> u64 {
        self.states.values().map(|s| s.retained).sum()
    }
}

pub struct Demux<'d, I> {
    demux: &'d mut Demultiplexer,
    stream: I,
    failed: bool,
}

impl<I> Iterator for Demux<'_, I>
where
    I: Iterator<Item = Result<BagMessage>>,
{
    type Item = Result<Retained>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for item in self.stream.by_ref() {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            if let Some(sequence) = self.demux.offer(&message.topic) {
                return Some(Ok(Retained { message, sequence }));
            }
        }
        None
    }
}

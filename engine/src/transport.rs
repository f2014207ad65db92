/*
 * PanSim
 * Copyright (c) 2020  ThoughtWorks, Inc.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Rank-to-rank message passing. One unbounded FIFO mailbox per rank; the
//! scatter convention sends one message per source to every destination,
//! with an explicit empty payload when there is nothing to ship, which is
//! what makes the count-to-N barriers well defined.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};
use crate::models::custom_types::{Count, Rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorId {
    Location,
    Progression,
    Behavior,
    Main,
}

#[derive(Debug, Clone)]
pub enum Message {
    StartTick,
    /// Visit record batch, or nothing from this source.
    Visit(Option<Vec<u8>>),
    CurrentState(Option<Vec<u8>>),
    VisitOutput(Option<Vec<u8>>),
    NewState(Option<Vec<u8>>),
    /// Per-state population counts from one behavior rank.
    EndTick(Vec<Count>),
    Shutdown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::StartTick => "start_tick",
            Message::Visit(_) => "visit",
            Message::CurrentState(_) => "current_state",
            Message::VisitOutput(_) => "visit_output",
            Message::NewState(_) => "new_state",
            Message::EndTick(_) => "end_tick",
            Message::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: ActorId,
    pub from: Rank,
    pub msg: Message,
}

/// Senders to every rank's mailbox; cheap to clone into each worker.
#[derive(Clone)]
pub struct Network {
    senders: Vec<UnboundedSender<Envelope>>,
}

impl Network {
    pub fn new(n_ranks: usize) -> (Network, Vec<UnboundedReceiver<Envelope>>) {
        let mut senders = Vec::with_capacity(n_ranks);
        let mut receivers = Vec::with_capacity(n_ranks);
        for _ in 0..n_ranks {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }
        (Network { senders }, receivers)
    }

    pub fn n_ranks(&self) -> usize {
        self.senders.len()
    }

    pub fn send(&self, to_rank: Rank, envelope: Envelope) -> Result<()> {
        self.senders[to_rank]
            .send(envelope)
            .map_err(|_| Error::Transport(format!("mailbox of rank {} is closed", to_rank)))
    }

    pub fn broadcast(&self, from: Rank, to: ActorId, msg: Message) -> Result<()> {
        for rank in 0..self.n_ranks() {
            self.send(rank, Envelope { to, from, msg: msg.clone() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channels_are_fifo_per_source() {
        let (net, mut inboxes) = Network::new(2);
        for i in 0..3u64 {
            net.send(1, Envelope { to: ActorId::Main, from: 0, msg: Message::EndTick(vec![i]) })
                .unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            match inboxes[1].recv().await.unwrap().msg {
                Message::EndTick(row) => seen.push(row[0]),
                other => panic!("unexpected message {}", other.kind()),
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_rank() {
        let (net, mut inboxes) = Network::new(3);
        net.broadcast(0, ActorId::Behavior, Message::StartTick).unwrap();
        for inbox in inboxes.iter_mut() {
            let envelope = inbox.recv().await.unwrap();
            assert!(matches!(envelope.msg, Message::StartTick));
            assert_eq!(envelope.to, ActorId::Behavior);
        }
    }
}

//! # Wire Envelope
//!
//! Every message on the overlay is a JSON [`Message`] envelope: the
//! originating peer, a [`Topic`], and a payload string. Payload-bearing
//! topics carry JSON inside the string; Stake replies carry a textual
//! float; Validator announcements carry a bare peer id; the literal
//! `"request"` solicits a reply on any topic.
//!
//! Decoding goes through exactly one dispatch point per direction
//! ([`Message::decode`] for gossip, [`Message::decode_reply`] for the
//! `/reply` channel), returning the typed [`Payload`] sum — a malformed
//! payload is a single decode error, not a scattered cast.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::consensus::pos::Vote;
use crate::error::{CoreError, Result};
use crate::ledger::block::Block;
use crate::ledger::blockchain::LedgerSnapshot;
use crate::ledger::transaction::Transaction;

/// Payload soliciting a reply rather than carrying data.
pub const REQUEST: &str = "request";

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// The fixed set of gossip topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// New transactions entering the network.
    Transaction,
    /// Committed blocks.
    Block,
    /// Full-chain solicitation and replies (bootstrap sync).
    Blockchain,
    /// Candidate blocks and the votes on them.
    Consensus,
    /// Stake solicitation and replies.
    Stake,
    /// Announcement of the elected validator.
    Validator,
}

impl Topic {
    /// Every topic, for bulk subscription.
    pub const ALL: [Topic; 6] = [
        Topic::Transaction,
        Topic::Block,
        Topic::Blockchain,
        Topic::Consensus,
        Topic::Stake,
        Topic::Validator,
    ];

    /// The lowercase wire name, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Block => "block",
            Self::Blockchain => "blockchain",
            Self::Consensus => "consensus",
            Self::Stake => "stake",
            Self::Validator => "validator",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The typed content of a message, after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A transaction to admit.
    Transaction(Transaction),
    /// A committed or candidate block.
    Block(Block),
    /// A full chain, answering a Blockchain request.
    Chain(LedgerSnapshot),
    /// A verdict on a candidate block.
    Vote(Vote),
    /// A peer's stake, answering a Stake request.
    Stake(f64),
    /// The elected peer id.
    Validator(String),
    /// A reply solicitation.
    Request,
}

impl Payload {
    /// The wire form of this payload.
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Transaction(tx) => serde_json::to_string(tx)?,
            Self::Block(block) => serde_json::to_string(block)?,
            Self::Chain(snapshot) => serde_json::to_string(snapshot)?,
            Self::Vote(vote) => serde_json::to_string(vote)?,
            Self::Stake(stake) => stake.to_string(),
            Self::Validator(peer) => peer.clone(),
            Self::Request => REQUEST.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The envelope every overlay message travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Peer id of the originator.
    pub peer: String,
    /// The topic this message belongs to.
    pub topic: Topic,
    /// Encoded payload; see the module docs for the per-topic form.
    pub payload: String,
}

impl Message {
    /// Builds an envelope.
    pub fn new(peer: impl Into<String>, topic: Topic, payload: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            topic,
            payload: payload.into(),
        }
    }

    /// Decodes a message received over gossip. Consensus carries the
    /// candidate block on this direction; votes travel on the reply
    /// channel.
    pub fn decode(&self) -> Result<Payload> {
        if self.payload == REQUEST {
            return Ok(Payload::Request);
        }

        Ok(match self.topic {
            Topic::Transaction => Payload::Transaction(serde_json::from_str(&self.payload)?),
            Topic::Block | Topic::Consensus => Payload::Block(serde_json::from_str(&self.payload)?),
            Topic::Blockchain => Payload::Chain(serde_json::from_str(&self.payload)?),
            Topic::Stake => Payload::Stake(parse_stake(&self.payload)?),
            Topic::Validator => Payload::Validator(self.payload.clone()),
        })
    }

    /// Decodes a message received on the `/reply` channel. Only the three
    /// solicited topics carry replies; anything else is malformed.
    pub fn decode_reply(&self) -> Result<Payload> {
        Ok(match self.topic {
            Topic::Blockchain => Payload::Chain(serde_json::from_str(&self.payload)?),
            Topic::Consensus => Payload::Vote(serde_json::from_str(&self.payload)?),
            Topic::Stake => Payload::Stake(parse_stake(&self.payload)?),
            other => {
                return Err(CoreError::InvalidData(format!(
                    "unexpected reply on topic {other}"
                )))
            }
        })
    }
}

fn parse_stake(payload: &str) -> Result<f64> {
    payload
        .trim()
        .parse::<f64>()
        .map_err(|e| CoreError::InvalidData(format!("stake is not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::TxKind;

    fn sample_transaction() -> Transaction {
        Transaction {
            sender: "s".into(),
            receiver: "r".into(),
            signature: "sig".into(),
            amount: 2.5,
            nonce: 1,
            timestamp: 1_700_000_000,
            kind: TxKind::Regular,
        }
    }

    #[test]
    fn topic_wire_names() {
        for topic in Topic::ALL {
            let json = serde_json::to_string(&topic).unwrap();
            assert_eq!(json, format!("\"{}\"", topic.as_str()));
        }
    }

    #[test]
    fn transaction_roundtrip_through_the_envelope() {
        let tx = sample_transaction();
        let payload = Payload::Transaction(tx.clone()).encode().unwrap();
        let message = Message::new("peer-1", Topic::Transaction, payload);

        let wire = serde_json::to_string(&message).unwrap();
        let received: Message = serde_json::from_str(&wire).unwrap();

        assert_eq!(received.decode().unwrap(), Payload::Transaction(tx));
    }

    #[test]
    fn request_decodes_on_any_topic() {
        for topic in Topic::ALL {
            let message = Message::new("peer-1", topic, "request");
            assert_eq!(message.decode().unwrap(), Payload::Request);
        }
    }

    #[test]
    fn consensus_gossip_carries_a_block_and_replies_carry_votes() {
        let vote = Vote {
            block_hash: "abc".into(),
            valid: true,
        };
        let message = Message::new(
            "peer-1",
            Topic::Consensus,
            Payload::Vote(vote.clone()).encode().unwrap(),
        );

        assert_eq!(message.decode_reply().unwrap(), Payload::Vote(vote));
        // The same bytes are NOT a valid candidate block.
        assert!(message.decode().is_err());
    }

    #[test]
    fn stake_travels_as_a_textual_float() {
        let payload = Payload::Stake(12.5).encode().unwrap();
        assert_eq!(payload, "12.5");

        let message = Message::new("peer-1", Topic::Stake, payload);
        assert_eq!(message.decode_reply().unwrap(), Payload::Stake(12.5));
    }

    #[test]
    fn validator_travels_as_a_bare_peer_id() {
        let payload = Payload::Validator("12D3KooW".into()).encode().unwrap();
        let message = Message::new("peer-1", Topic::Validator, payload);
        assert_eq!(
            message.decode().unwrap(),
            Payload::Validator("12D3KooW".into())
        );
    }

    #[test]
    fn malformed_payloads_are_one_decode_error() {
        let message = Message::new("peer-1", Topic::Block, "not json");
        assert!(message.decode().is_err());

        let message = Message::new("peer-1", Topic::Stake, "not a float");
        assert!(message.decode_reply().is_err());

        // Replies never travel on unsolicited topics.
        let message = Message::new("peer-1", Topic::Validator, "peer-2");
        assert!(matches!(
            message.decode_reply(),
            Err(CoreError::InvalidData(_))
        ));
    }
}

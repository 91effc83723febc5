//! Header extra-data layout
//!
//! `extra_data = vanity(32) || payload || seal(65)` where the payload is
//! either empty, a single vote (`target(20) || flag(1)`), or on checkpoint
//! blocks the sorted signer list.

use crate::{ConsensusError, ConsensusResult};
use chain_core::crypto::SIGNATURE_LENGTH;
use chain_core::{Address, BlockHeader, Hash, Signature, Timestamp};

/// Fixed number of extra-data prefix bytes reserved for signer vanity
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the signer seal
pub const EXTRA_SEAL: usize = SIGNATURE_LENGTH;

/// Encoded size of a single vote
pub const VOTE_LENGTH: usize = Address::LEN + 1;

/// Vote flag for adding a signer
pub const VOTE_AUTHORIZE: u8 = 0xff;

/// Vote flag for removing a signer
pub const VOTE_DROP: u8 = 0x00;

/// Block difficulty for in-turn signatures
pub const DIFF_IN_TURN: u64 = 2;

/// Block difficulty for out-of-turn signatures
pub const DIFF_NO_TURN: u64 = 1;

/// Vote carried by a header, cast by its author
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderVote {
    pub target: Address,
    pub authorize: bool,
}

/// Consensus payload between vanity and seal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderPayload {
    Empty,
    Vote(HeaderVote),
    Checkpoint(Vec<Address>),
}

impl HeaderPayload {
    /// The vote, if the payload carries one
    pub fn vote(&self) -> Option<HeaderVote> {
        match self {
            HeaderPayload::Vote(vote) => Some(*vote),
            _ => None,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            HeaderPayload::Empty => Vec::new(),
            HeaderPayload::Vote(vote) => {
                let mut body = vote.target.as_bytes().to_vec();
                body.push(if vote.authorize { VOTE_AUTHORIZE } else { VOTE_DROP });
                body
            }
            HeaderPayload::Checkpoint(signers) => signers
                .iter()
                .flat_map(|signer| signer.as_bytes().iter().copied())
                .collect(),
        }
    }
}

/// Decode the payload of `extra`; `checkpoint` selects the signer-list layout
pub fn decode_payload(extra: &[u8], checkpoint: bool) -> ConsensusResult<HeaderPayload> {
    if extra.len() < EXTRA_VANITY {
        return Err(ConsensusError::MalformedHeader(
            "extra-data 32 byte vanity prefix missing".to_string(),
        ));
    }
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(ConsensusError::MissingSignature);
    }
    let body = &extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL];

    if checkpoint {
        if body.is_empty() || body.len() % Address::LEN != 0 {
            return Err(ConsensusError::MalformedHeader(
                "invalid signer list on checkpoint block".to_string(),
            ));
        }
        let signers: Vec<Address> = body.chunks(Address::LEN).map(Address::from_slice).collect();
        if signers.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConsensusError::MalformedHeader(
                "checkpoint signers not in canonical order".to_string(),
            ));
        }
        return Ok(HeaderPayload::Checkpoint(signers));
    }

    match body.len() {
        0 => Ok(HeaderPayload::Empty),
        VOTE_LENGTH => {
            let authorize = match body[Address::LEN] {
                VOTE_AUTHORIZE => true,
                VOTE_DROP => false,
                flag => {
                    return Err(ConsensusError::MalformedHeader(format!(
                        "invalid vote flag 0x{:02x}",
                        flag
                    )))
                }
            };
            Ok(HeaderPayload::Vote(HeaderVote {
                target: Address::from_slice(&body[..Address::LEN]),
                authorize,
            }))
        }
        len => Err(ConsensusError::MalformedHeader(format!(
            "extra-data carries more than one vote ({} payload bytes)",
            len
        ))),
    }
}

/// Build extra-data from a vanity (padded or truncated to 32 bytes), a
/// payload and an empty seal
pub fn encode_extra(vanity: &[u8], payload: &HeaderPayload) -> Vec<u8> {
    let mut extra = vanity[..vanity.len().min(EXTRA_VANITY)].to_vec();
    extra.resize(EXTRA_VANITY, 0);
    extra.extend_from_slice(&payload.encode());
    extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
    extra
}

/// Signer list of a checkpoint header
pub fn checkpoint_signers(header: &BlockHeader) -> ConsensusResult<Vec<Address>> {
    match decode_payload(&header.extra_data, true)? {
        HeaderPayload::Checkpoint(signers) => Ok(signers),
        _ => Err(ConsensusError::MalformedHeader(
            "checkpoint block without signer list".to_string(),
        )),
    }
}

/// Overwrite the seal suffix of `header`
pub fn write_seal(header: &mut BlockHeader, signature: &Signature) -> ConsensusResult<()> {
    let len = header.extra_data.len();
    if len < EXTRA_VANITY + EXTRA_SEAL {
        return Err(ConsensusError::MissingSignature);
    }
    header.extra_data[len - EXTRA_SEAL..].copy_from_slice(&signature.to_bytes());
    Ok(())
}

/// Genesis header authorizing `signers`
pub fn genesis_header(signers: &[Address], timestamp: Timestamp) -> BlockHeader {
    let mut signers = signers.to_vec();
    signers.sort();
    signers.dedup();

    BlockHeader {
        parent_hash: Hash::zero(),
        number: 0,
        state_root: Hash::zero(),
        transactions_root: Hash::zero(),
        receipts_root: Hash::zero(),
        difficulty: DIFF_NO_TURN,
        timestamp,
        extra_data: encode_extra(&[], &HeaderPayload::Checkpoint(signers)),
        nonce: 0,
        gas_limit: 8_000_000,
        gas_used: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_empty_payload() {
        let extra = encode_extra(b"vanity", &HeaderPayload::Empty);
        assert_eq!(extra.len(), EXTRA_VANITY + EXTRA_SEAL);
        assert_eq!(&extra[..6], b"vanity");
        assert_eq!(decode_payload(&extra, false).unwrap(), HeaderPayload::Empty);
    }

    #[test]
    fn test_vote_payload() {
        let vote = HeaderVote {
            target: addr(9),
            authorize: false,
        };
        let extra = encode_extra(&[1u8; 40], &HeaderPayload::Vote(vote));
        assert_eq!(extra.len(), EXTRA_VANITY + VOTE_LENGTH + EXTRA_SEAL);

        let payload = decode_payload(&extra, false).unwrap();
        assert_eq!(payload.vote(), Some(vote));
    }

    #[test]
    fn test_rejects_second_vote() {
        let mut extra = vec![0u8; EXTRA_VANITY];
        for _ in 0..2 {
            extra.extend_from_slice(addr(3).as_bytes());
            extra.push(VOTE_AUTHORIZE);
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);

        assert!(matches!(
            decode_payload(&extra, false),
            Err(ConsensusError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_vote_flag() {
        let mut extra = encode_extra(
            &[],
            &HeaderPayload::Vote(HeaderVote {
                target: addr(3),
                authorize: true,
            }),
        );
        extra[EXTRA_VANITY + Address::LEN] = 0x01;
        assert!(matches!(
            decode_payload(&extra, false),
            Err(ConsensusError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_short_extra() {
        assert!(matches!(
            decode_payload(&[0u8; 10], false),
            Err(ConsensusError::MalformedHeader(_))
        ));
        assert_eq!(
            decode_payload(&[0u8; EXTRA_VANITY + 10], false),
            Err(ConsensusError::MissingSignature)
        );
    }

    #[test]
    fn test_checkpoint_payload() {
        let extra = encode_extra(&[], &HeaderPayload::Checkpoint(vec![addr(1), addr(2)]));
        assert_eq!(
            decode_payload(&extra, true).unwrap(),
            HeaderPayload::Checkpoint(vec![addr(1), addr(2)])
        );

        let unsorted = encode_extra(&[], &HeaderPayload::Checkpoint(vec![addr(2), addr(1)]));
        assert!(decode_payload(&unsorted, true).is_err());

        let empty = encode_extra(&[], &HeaderPayload::Empty);
        assert!(decode_payload(&empty, true).is_err());
    }

    #[test]
    fn test_genesis_sorts_and_dedups() {
        let genesis = genesis_header(&[addr(3), addr(1), addr(3)], 0);
        assert_eq!(checkpoint_signers(&genesis).unwrap(), vec![addr(1), addr(3)]);
    }

    #[test]
    fn test_write_seal() {
        let mut header = genesis_header(&[addr(1)], 0);
        let signature = Signature::new([4u8; 32], [5u8; 32], 1);
        write_seal(&mut header, &signature).unwrap();

        assert_eq!(header.seal().unwrap(), &signature.to_bytes()[..]);
        assert_eq!(checkpoint_signers(&header).unwrap(), vec![addr(1)]);
    }
}

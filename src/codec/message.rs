//! Initiation Event Decoding
//!
//! Both portals emit the same event shape when a cross-domain message is
//! initiated: nonce, sender and target are indexed; value, gas limit, data and
//! the message hash are ABI-encoded in the log data.

use crate::error::{BridgeError, Result};
use crate::types::{CrossDomainMessage, Direction};
use ethers::abi::ParamType;
use ethers::types::{Address, Log, H256, U256};
use ethers::utils::keccak256;

/// Version carried by every message the portals currently emit
pub const MESSAGE_VERSION: u64 = 0;

const DEPOSIT_INITIATED: &str =
    "DepositInitiated(uint256,address,address,uint256,uint256,bytes,bytes32)";
const WITHDRAWAL_INITIATED: &str =
    "WithdrawalInitiated(uint256,address,address,uint256,uint256,bytes,bytes32)";

/// topic0 of the initiation event emitted on the source chain
pub fn initiation_topic(direction: Direction) -> H256 {
    let signature = match direction {
        Direction::Deposit => DEPOSIT_INITIATED,
        Direction::Withdrawal => WITHDRAWAL_INITIATED,
    };
    H256::from(keccak256(signature.as_bytes()))
}

/// Decode a portal initiation log into the message it carries
///
/// The hash recomputed from the decoded fields must equal the one the portal
/// emitted, otherwise the finalize call built from it could never succeed.
pub fn decode_initiation_log(direction: Direction, log: &Log) -> Result<CrossDomainMessage> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| BridgeError::MalformedEvent("log has no topics".into()))?;
    if *topic0 != initiation_topic(direction) {
        return Err(BridgeError::MalformedEvent(format!(
            "not a {} initiation event: topic0 {:?}",
            direction.as_str(),
            topic0
        )));
    }
    if log.topics.len() != 4 {
        return Err(BridgeError::MalformedEvent(format!(
            "expected 3 indexed topics, got {}",
            log.topics.len() - 1
        )));
    }

    let nonce = U256::from_big_endian(log.topics[1].as_bytes());
    let sender = topic_address(&log.topics[2], "sender")?;
    let target = topic_address(&log.topics[3], "target")?;

    let mut tokens = ethers::abi::decode(
        &[
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Bytes,
            ParamType::FixedBytes(32),
        ],
        &log.data,
    )
    .map_err(|e| BridgeError::MalformedEvent(format!("event data: {}", e)))?
    .into_iter();

    let value = tokens
        .next()
        .and_then(|t| t.into_uint())
        .ok_or_else(|| BridgeError::MalformedEvent("missing value".into()))?;
    let gas_limit = tokens
        .next()
        .and_then(|t| t.into_uint())
        .ok_or_else(|| BridgeError::MalformedEvent("missing gasLimit".into()))?;
    let data = tokens
        .next()
        .and_then(|t| t.into_bytes())
        .ok_or_else(|| BridgeError::MalformedEvent("missing data".into()))?;
    let emitted_hash = tokens
        .next()
        .and_then(|t| t.into_fixed_bytes())
        .map(|b| H256::from_slice(&b))
        .ok_or_else(|| BridgeError::MalformedEvent("missing message hash".into()))?;

    let message = CrossDomainMessage {
        version: U256::from(MESSAGE_VERSION),
        nonce,
        sender,
        target,
        value,
        gas_limit,
        data: data.into(),
    };

    let computed = message.hash();
    if computed != emitted_hash {
        return Err(BridgeError::MalformedEvent(format!(
            "message hash mismatch: emitted {:?}, computed {:?}",
            emitted_hash, computed
        )));
    }
    Ok(message)
}

/// Pick the portal's initiation event out of a submission receipt
///
/// The standard bridge logs its own event before the portal does, so the
/// position of the initiation log is not fixed.
pub fn find_initiation_message(
    direction: Direction,
    portal: Address,
    logs: &[Log],
) -> Result<CrossDomainMessage> {
    let topic = initiation_topic(direction);
    let log = logs
        .iter()
        .find(|log| log.address == portal && log.topics.first() == Some(&topic))
        .ok_or_else(|| {
            BridgeError::MalformedEvent(format!(
                "receipt has no {} initiation event from portal {:?}",
                direction.as_str(),
                portal
            ))
        })?;
    decode_initiation_log(direction, log)
}

fn topic_address(topic: &H256, field: &str) -> Result<Address> {
    if topic.as_bytes()[..12].iter().any(|b| *b != 0) {
        return Err(BridgeError::MalformedEvent(format!(
            "indexed {} is not an address",
            field
        )));
    }
    Ok(Address::from(*topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{initiation_log, sample_message};
    use ethers::types::Bytes;

    #[test]
    fn test_decode_reproduces_emitted_hash() {
        let portal = Address::repeat_byte(0xaa);
        for direction in [Direction::Deposit, Direction::Withdrawal] {
            let message = sample_message(U256::from(5), U256::exp10(17));
            let log = initiation_log(direction, portal, &message, 100);
            let decoded = decode_initiation_log(direction, &log).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decoded.hash(), message.hash());
        }
    }

    #[test]
    fn test_decode_keeps_calldata_payload() {
        let mut message = sample_message(U256::from(1), U256::from(42));
        message.data = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]);
        let log = initiation_log(Direction::Withdrawal, Address::zero(), &message, 7);
        let decoded = decode_initiation_log(Direction::Withdrawal, &log).unwrap();
        assert_eq!(decoded.data, message.data);
    }

    #[test]
    fn test_wrong_direction_is_malformed() {
        let message = sample_message(U256::from(1), U256::from(1));
        let log = initiation_log(Direction::Deposit, Address::zero(), &message, 1);
        let err = decode_initiation_log(Direction::Withdrawal, &log).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEvent(_)));
    }

    #[test]
    fn test_missing_topics_is_malformed() {
        let message = sample_message(U256::from(1), U256::from(1));
        let mut log = initiation_log(Direction::Deposit, Address::zero(), &message, 1);
        log.topics.truncate(2);
        assert!(matches!(
            decode_initiation_log(Direction::Deposit, &log),
            Err(BridgeError::MalformedEvent(_))
        ));

        log.topics.clear();
        assert!(matches!(
            decode_initiation_log(Direction::Deposit, &log),
            Err(BridgeError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_truncated_data_is_malformed() {
        let message = sample_message(U256::from(1), U256::from(1));
        let mut log = initiation_log(Direction::Deposit, Address::zero(), &message, 1);
        log.data = Bytes::from(log.data[..40].to_vec());
        assert!(matches!(
            decode_initiation_log(Direction::Deposit, &log),
            Err(BridgeError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_tampered_field_fails_hash_check() {
        let message = sample_message(U256::from(3), U256::from(10));
        let mut log = initiation_log(Direction::Deposit, Address::zero(), &message, 1);
        log.topics[1] = H256::from_low_u64_be(4);
        let err = decode_initiation_log(Direction::Deposit, &log).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn test_find_skips_bridge_log() {
        let portal = Address::repeat_byte(0x01);
        let message = sample_message(U256::from(9), U256::from(5));
        let bridge_log = Log {
            address: Address::repeat_byte(0x02),
            topics: vec![H256::repeat_byte(0x33)],
            ..Default::default()
        };
        let logs = vec![bridge_log, initiation_log(Direction::Deposit, portal, &message, 3)];
        let found = find_initiation_message(Direction::Deposit, portal, &logs).unwrap();
        assert_eq!(found.nonce, U256::from(9));

        let err = find_initiation_message(Direction::Deposit, Address::repeat_byte(0x03), &logs)
            .unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEvent(_)));
    }
}

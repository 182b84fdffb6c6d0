//! Call Encoding
//!
//! Calldata for the bridge entry point and the two portal finalize functions.

use crate::types::{CrossDomainMessage, Direction, StorageProof, TxPayload};
use ethers::abi::{short_signature, ParamType, Token};
use ethers::types::{Address, Bytes, U256};

/// What a caller asks the bridge to move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: Direction,
    pub amount: U256,
    /// Gas the message gets when relayed on the destination chain
    pub min_gas_limit: u32,
    pub extra_data: Bytes,
}

fn message_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Bytes,
    ])
}

fn proof_params() -> [ParamType; 2] {
    [
        ParamType::Array(Box::new(ParamType::Bytes)),
        ParamType::Array(Box::new(ParamType::Bytes)),
    ]
}

fn proof_tokens(proof: &StorageProof) -> [Token; 2] {
    let nodes = |nodes: &[Bytes]| Token::Array(nodes.iter().map(|n| Token::Bytes(n.to_vec())).collect());
    [nodes(&proof.account_proof), nodes(&proof.storage_proof)]
}

fn with_selector(name: &str, params: &[ParamType], tokens: &[Token]) -> Bytes {
    let mut data = short_signature(name, params).to_vec();
    data.extend(ethers::abi::encode(tokens));
    data.into()
}

/// `bridgeETH(uint32 minGasLimit, bytes extraData)` with the amount as value
pub fn encode_bridge_call(bridge: Address, request: &TransferRequest) -> TxPayload {
    let data = with_selector(
        "bridgeETH",
        &[ParamType::Uint(32), ParamType::Bytes],
        &[
            Token::Uint(U256::from(request.min_gas_limit)),
            Token::Bytes(request.extra_data.to_vec()),
        ],
    );
    TxPayload {
        to: bridge,
        data,
        value: request.amount,
    }
}

pub fn finalize_deposit_params() -> Vec<ParamType> {
    let [account, storage] = proof_params();
    vec![ParamType::Uint(256), message_param(), account, storage]
}

pub fn finalize_withdrawal_params() -> Vec<ParamType> {
    let [account, storage] = proof_params();
    vec![message_param(), ParamType::Uint(256), account, storage]
}

/// `finalizeDepositTransaction(uint256 l1BlockNumber, CrossDomainMessage tx,
/// bytes[] accountProof, bytes[] storageProof)` on the L2 portal
pub fn encode_finalize_deposit(
    portal: Address,
    message: &CrossDomainMessage,
    l1_block_number: u64,
    proof: &StorageProof,
) -> TxPayload {
    let [account, storage] = proof_tokens(proof);
    let data = with_selector(
        "finalizeDepositTransaction",
        &finalize_deposit_params(),
        &[
            Token::Uint(U256::from(l1_block_number)),
            Token::Tuple(message.tokens()),
            account,
            storage,
        ],
    );
    TxPayload {
        to: portal,
        data,
        value: U256::zero(),
    }
}

/// `finalizeWithdrawalTransaction(CrossDomainMessage tx, uint256 assertionID,
/// bytes[] accountProof, bytes[] storageProof)` on the L1 portal
pub fn encode_finalize_withdrawal(
    portal: Address,
    message: &CrossDomainMessage,
    assertion_id: U256,
    proof: &StorageProof,
) -> TxPayload {
    let [account, storage] = proof_tokens(proof);
    let data = with_selector(
        "finalizeWithdrawalTransaction",
        &finalize_withdrawal_params(),
        &[Token::Tuple(message.tokens()), Token::Uint(assertion_id), account, storage],
    );
    TxPayload {
        to: portal,
        data,
        value: U256::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_initiation_log;
    use crate::test_utils::{initiation_log, sample_message, sample_proof};
    use ethers::types::H256;

    fn message_from_tuple(token: Token) -> CrossDomainMessage {
        let fields = token.into_tuple().unwrap();
        CrossDomainMessage {
            version: fields[0].clone().into_uint().unwrap(),
            nonce: fields[1].clone().into_uint().unwrap(),
            sender: fields[2].clone().into_address().unwrap(),
            target: fields[3].clone().into_address().unwrap(),
            value: fields[4].clone().into_uint().unwrap(),
            gas_limit: fields[5].clone().into_uint().unwrap(),
            data: fields[6].clone().into_bytes().unwrap().into(),
        }
    }

    #[test]
    fn test_bridge_call_carries_amount_as_value() {
        let request = TransferRequest {
            direction: Direction::Deposit,
            amount: U256::exp10(17),
            min_gas_limit: 200_000,
            extra_data: Bytes::new(),
        };
        let bridge = Address::repeat_byte(0x42);
        let payload = encode_bridge_call(bridge, &request);
        assert_eq!(payload.to, bridge);
        assert_eq!(payload.value, U256::exp10(17));
        assert_eq!(
            &payload.data[..4],
            &short_signature("bridgeETH", &[ParamType::Uint(32), ParamType::Bytes])
        );
        let tokens =
            ethers::abi::decode(&[ParamType::Uint(32), ParamType::Bytes], &payload.data[4..]).unwrap();
        assert_eq!(tokens[0], Token::Uint(U256::from(200_000)));
    }

    #[test]
    fn test_finalize_withdrawal_preserves_message_hash() {
        let message = sample_message(U256::from(11), U256::from(5_000));
        let log = initiation_log(Direction::Withdrawal, Address::zero(), &message, 40);
        let decoded = decode_initiation_log(Direction::Withdrawal, &log).unwrap();

        let payload = encode_finalize_withdrawal(
            Address::repeat_byte(0x10),
            &decoded,
            U256::from(3),
            &sample_proof(),
        );
        let mut tokens =
            ethers::abi::decode(&finalize_withdrawal_params(), &payload.data[4..]).unwrap();
        assert_eq!(tokens[1], Token::Uint(U256::from(3)));
        let reencoded = message_from_tuple(tokens.remove(0));
        assert_eq!(reencoded.hash(), message.hash());
        // value, gasLimit, data offset, then the hash
        let emitted = H256::from_slice(&log.data[96..128]);
        assert_eq!(reencoded.hash(), emitted);
    }

    #[test]
    fn test_finalize_deposit_encodes_proof_block_and_nodes() {
        let message = sample_message(U256::from(2), U256::from(77));
        let proof = sample_proof();
        let payload = encode_finalize_deposit(Address::repeat_byte(0x20), &message, 104, &proof);
        let tokens = ethers::abi::decode(&finalize_deposit_params(), &payload.data[4..]).unwrap();
        assert_eq!(tokens[0], Token::Uint(U256::from(104)));
        assert_eq!(message_from_tuple(tokens[1].clone()), message);
        let account = tokens[2].clone().into_array().unwrap();
        assert_eq!(account.len(), proof.account_proof.len());
        assert_eq!(payload.value, U256::zero());
    }
}

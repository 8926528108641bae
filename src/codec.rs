//! Conversion between the backend's language-neutral instruction and
//! transaction encodings and their Solana counterparts.
use {
    crate::{Error, Result},
    base64::prelude::*,
    serde::{Deserialize, Serialize},
    solana_instruction::{AccountMeta, Instruction},
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_transaction::versioned::VersionedTransaction,
    std::str::FromStr,
};

/// One account reference of an [`InstructionDescriptor`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    #[serde(alias = "address")]
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Instruction as produced by the backend: base58 addresses and a base64
/// payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionDescriptor {
    pub program_id: String,
    #[serde(alias = "accounts")]
    pub keys: Vec<AccountDescriptor>,
    pub data: String,
}

pub fn parse_address(value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| Error::MalformedInstruction(format!("invalid address {value}: {e}")))
}

/// Converts a backend descriptor into an executable [`Instruction`].
pub fn decode(descriptor: &InstructionDescriptor) -> Result<Instruction> {
    let program_id = parse_address(&descriptor.program_id)?;
    let accounts = descriptor
        .keys
        .iter()
        .map(|key| {
            Ok(AccountMeta {
                pubkey: parse_address(&key.pubkey)?,
                is_signer: key.is_signer,
                is_writable: key.is_writable,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let data = BASE64_STANDARD.decode(descriptor.data.as_bytes())?;
    Ok(Instruction {
        program_id,
        accounts,
        data,
    })
}

pub fn decode_all(descriptors: &[InstructionDescriptor]) -> Result<Vec<Instruction>> {
    descriptors.iter().map(decode).collect()
}

/// Inverse of [`decode`].
pub fn encode(instruction: &Instruction) -> InstructionDescriptor {
    InstructionDescriptor {
        program_id: instruction.program_id.to_string(),
        keys: instruction
            .accounts
            .iter()
            .map(|meta| AccountDescriptor {
                pubkey: meta.pubkey.to_string(),
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            })
            .collect(),
        data: BASE64_STANDARD.encode(&instruction.data),
    }
}

/// Decodes base58 encoded 64 byte secret keys handed out by the backend for
/// accounts it wants created in the same transaction.
pub fn decode_signers(secrets: &[String]) -> Result<Vec<Keypair>> {
    secrets
        .iter()
        .map(|secret| {
            let bytes = bs58::decode(secret)
                .into_vec()
                .map_err(|e| Error::MalformedInstruction(format!("invalid signer key: {e}")))?;
            Keypair::try_from(bytes.as_slice())
                .map_err(|e| Error::MalformedInstruction(format!("invalid signer key: {e}")))
        })
        .collect()
}

/// Decodes a base64 bincode [`VersionedTransaction`].
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = BASE64_STANDARD.decode(encoded.as_bytes())?;
    bincode::deserialize(&bytes)
        .map_err(|e| Error::MalformedInstruction(format!("invalid transaction bytes: {e}")))
}

pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String> {
    Ok(BASE64_STANDARD.encode(bincode::serialize(tx)?))
}

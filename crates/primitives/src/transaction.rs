use crate::{hash256, TxHash};
use serde::{Deserialize, Serialize};

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the funding transaction.
    pub txid: TxHash,
    /// Output index within the funding transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint, only valid in a coinbase input.
    pub fn null() -> Self {
        Self { txid: TxHash::ZERO, index: u32::MAX }
    }

    /// Returns true if this is the null outpoint.
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.txid.is_zero()
    }
}

/// A transaction input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Relative locktime / replacement sequence.
    pub sequence: u32,
    /// The spent output, populated before `accept`/`connect`.
    ///
    /// Metadata, not part of the consensus encoding.
    #[serde(skip)]
    pub prevout: Option<TxOutput>,
}

impl TxInput {
    /// Final inputs opt out of locktime enforcement.
    pub const fn is_final(&self) -> bool {
        self.sequence == u32::MAX
    }
}

/// A transaction output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

/// A transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction version.
    pub version: u32,
    /// Inputs, at least one; a lone null-outpoint input makes a coinbase.
    pub inputs: Vec<TxInput>,
    /// Outputs, at least one.
    pub outputs: Vec<TxOutput>,
    /// Absolute locktime, by height when below the locktime threshold.
    pub lock_time: u32,
}

impl Transaction {
    /// Returns true if this is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Consensus encoding of the transaction.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.previous_output.txid.as_slice());
            out.extend_from_slice(&input.previous_output.index.to_le_bytes());
            write_varint(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Size of the consensus encoding in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4; // version + lock_time
        size += varint_size(self.inputs.len() as u64);
        for input in &self.inputs {
            size += 32 + 4 + varint_size(input.script_sig.len() as u64) + input.script_sig.len() + 4;
        }
        size += varint_size(self.outputs.len() as u64);
        for output in &self.outputs {
            size += 8 + varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        size
    }

    /// Computes the transaction hash.
    pub fn txid(&self) -> TxHash {
        hash256(&self.encode())
    }

    /// Sum of input prevout values; `None` if any prevout is unpopulated.
    pub fn total_input_value(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |sum, input| Some(sum + input.prevout.as_ref()?.value))
    }

    /// Sum of output values.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|output| output.value).sum()
    }

    /// Returns true if the transaction is final under the given height.
    pub fn is_final(&self, height: u64) -> bool {
        self.lock_time == 0 ||
            u64::from(self.lock_time) < height ||
            self.inputs.iter().all(TxInput::is_final)
    }
}

fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

const fn varint_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

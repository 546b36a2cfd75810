pub mod address;
pub mod bundle;
pub mod constants;
pub mod executor;
pub mod mempool;
pub mod rpc;

pub use address::{AddressDeriver, DerivationError};
pub use bundle::{BundleAssembler, PoolKeys, SwapSide, TransactionConfig};
pub use constants::{RAYDIUM_AMM_PROGRAM_ID, WSOL_MINT};
pub use executor::{ExecutionConfig, ExecutionEngine, ExecutionOutcome, ExecutionState};
pub use mempool::{MempoolWatcher, RelayMempoolSource, Trigger, TriggerSink};
pub use rpc::{ChainClient, RpcChainClient, SendConfig};

//! Method name to credit cost lookup.

use crate::CostConfig;
use std::collections::HashMap;

/// Credits charged for a method the table does not list.
pub const DEFAULT_COST: u64 = 10;

/// Built-in cost table, mirroring the bundled `creditgate.toml`.
pub const DEFAULT_METHOD_COSTS: &[(&str, u64)] = &[
    ("net_version", 1),
    ("eth_chainId", 1),
    ("eth_blockNumber", 10),
    ("eth_gasPrice", 10),
    ("eth_getBalance", 10),
    ("eth_getCode", 26),
    ("eth_getStorageAt", 17),
    ("eth_getTransactionCount", 26),
    ("eth_getBlockByNumber", 16),
    ("eth_getBlockByHash", 16),
    ("eth_getTransactionByHash", 17),
    ("eth_getTransactionReceipt", 15),
    ("eth_call", 26),
    ("eth_estimateGas", 87),
    ("eth_feeHistory", 10),
    ("eth_maxPriorityFeePerGas", 10),
    ("eth_getLogs", 75),
    ("eth_sendRawTransaction", 250),
    ("trace_transaction", 40),
    ("debug_traceTransaction", 309),
];

/// Static table of approximate credit costs per method.
///
/// Lookups never fail: unknown methods cost the default.
///
/// # Example
///
/// ```
/// use creditgate_rate_limit::CostModel;
///
/// let costs = CostModel::default().with_cost("eth_simulateV1", 40);
/// assert_eq!(costs.cost_of("eth_getBalance"), 10);
/// assert_eq!(costs.cost_of("eth_simulateV1"), 40);
/// assert_eq!(costs.cost_of("unknown_method_xyz"), costs.default_cost());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostModel {
    costs: HashMap<String, u64>,
    default_cost: u64,
}

impl CostModel {
    /// Create an empty table where every method costs `default_cost`.
    pub fn new(default_cost: u64) -> Self {
        Self {
            costs: HashMap::new(),
            default_cost,
        }
    }

    /// Build the table from configuration.
    pub fn from_config(config: &CostConfig) -> Self {
        let costs = config
            .methods()
            .iter()
            .map(|cost| (cost.method.clone(), cost.credits))
            .collect();
        Self {
            costs,
            default_cost: *config.default_cost(),
        }
    }

    /// Set the cost of a method, replacing any existing entry.
    pub fn with_cost(mut self, method: impl Into<String>, credits: u64) -> Self {
        self.costs.insert(method.into(), credits);
        self
    }

    /// Credits charged for one call of `method`.
    pub fn cost_of(&self, method: &str) -> u64 {
        self.costs.get(method).copied().unwrap_or(self.default_cost)
    }

    /// Credits charged for unlisted methods.
    pub fn default_cost(&self) -> u64 {
        self.default_cost
    }

    /// Iterate over the listed methods and their costs.
    pub fn methods(&self) -> impl Iterator<Item = (&str, u64)> {
        self.costs
            .iter()
            .map(|(method, credits)| (method.as_str(), *credits))
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&CostConfig::default())
    }
}

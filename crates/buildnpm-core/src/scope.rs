use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Dev,
    Prod,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(anyhow!("unsupported dependency scope '{other}'; supported: dev, prod")),
        }
    }

    /// Flag passed to `npm ls` to restrict the listing to this scope.
    pub fn list_flag(self) -> &'static str {
        match self {
            Self::Dev => "--dev",
            Self::Prod => "--prod",
        }
    }
}

/// Which dependency types the install actually pulled, as derived from the
/// effective npm configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeRestriction {
    #[default]
    Default,
    All,
    DevOnly,
    ProdOnly,
}

impl TypeRestriction {
    /// Scopes whose trees must be listed, in listing order.
    pub fn scopes(self) -> Vec<Scope> {
        let mut scopes = Vec::with_capacity(2);
        if self != Self::ProdOnly {
            scopes.push(Scope::Dev);
        }
        if self != Self::DevOnly {
            scopes.push(Scope::Prod);
        }
        scopes
    }

    pub fn is_set(self) -> bool {
        self != Self::Default
    }
}

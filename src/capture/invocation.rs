use crate::models::ServiceType;

/// How an argument vector handed to `torero` should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInvocation {
    /// `run service <type> <name> ...`
    Generic { service_type: String, name: String },
    /// `run service opentofu-plan <apply|destroy> <name> ...`
    WithOperation {
        service_type: String,
        operation: String,
        name: String,
    },
    PassThrough,
}

const OPERATIONS: [&str; 2] = ["apply", "destroy"];

impl ParsedInvocation {
    /// `args` excludes the program name.
    ///
    /// Operands are the tokens after `run service` up to the first flag. The
    /// operation form needs an opentofu type, a known operation and a name
    /// after it; otherwise the second operand is the name.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
        let ["run", "service", rest @ ..] = args.as_slice() else {
            return Self::PassThrough;
        };

        let operands: Vec<&str> = rest
            .iter()
            .copied()
            .take_while(|token| !token.starts_with('-'))
            .collect();

        match operands.as_slice() {
            [service_type, operation, name, ..]
                if *service_type == ServiceType::OpentofuPlan.as_str()
                    && OPERATIONS.contains(operation) =>
            {
                Self::WithOperation {
                    service_type: service_type.to_string(),
                    operation: operation.to_string(),
                    name: name.to_string(),
                }
            }
            [service_type, name, ..] => Self::Generic {
                service_type: service_type.to_string(),
                name: name.to_string(),
            },
            _ => Self::PassThrough,
        }
    }

    pub fn is_captured(&self) -> bool {
        !matches!(self, Self::PassThrough)
    }

    pub fn service_type(&self) -> Option<&str> {
        match self {
            Self::Generic { service_type, .. } | Self::WithOperation { service_type, .. } => {
                Some(service_type.as_str())
            }
            Self::PassThrough => None,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Generic { name, .. } | Self::WithOperation { name, .. } => Some(name.as_str()),
            Self::PassThrough => None,
        }
    }

    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::WithOperation { operation, .. } => Some(operation.as_str()),
            _ => None,
        }
    }
}

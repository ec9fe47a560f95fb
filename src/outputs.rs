use aws_types::region::Region;
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Stack {0} not found")]
    NotFound(String),
}

/// Outputs of a deployed stack, keyed by output name.
pub type Outputs = BTreeMap<String, String>;

/// Outputs of several stacks, keyed by the environment they belong to.
pub type OutputsByEnvironment = BTreeMap<String, Outputs>;

/// Build a CloudFormation client for `region`.
pub async fn client(region: String) -> aws_sdk_cloudformation::Client {
    let sdk_config = aws_config::from_env().region(Region::new(region)).load().await;

    aws_sdk_cloudformation::Client::new(&sdk_config)
}

pub struct StackOutputs {
    pub stack_name: String,

    client: aws_sdk_cloudformation::Client,
}

impl StackOutputs {
    pub fn new(client: aws_sdk_cloudformation::Client, stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            client,
        }
    }

    pub async fn fetch(&self) -> Result<Outputs, Error> {
        tracing::debug!(stack_name = %self.stack_name, "Describing stack");

        let result = self
            .client
            .describe_stacks()
            .stack_name(&self.stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(aws_sdk_cloudformation::types::SdkError::ServiceError { err, .. }) => {
                let message = err.to_string();
                if message.contains("does not exist") {
                    return Err(Error::NotFound(self.stack_name.clone()));
                }
                return Err(Error::ServiceError(message));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        let stack = match result.stacks().unwrap_or_default().first() {
            Some(stack) => stack,
            None => return Err(Error::NotFound(self.stack_name.clone())),
        };

        Ok(collect_outputs(stack.outputs().unwrap_or_default()))
    }
}

fn collect_outputs(outputs: &[aws_sdk_cloudformation::model::Output]) -> Outputs {
    outputs
        .iter()
        .filter_map(|output| match (output.output_key(), output.output_value()) {
            (Some(key), Some(value)) => Some((key.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

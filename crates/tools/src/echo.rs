use async_trait::async_trait;
use fleet::{CommandOptions, CommandRunner, EnvironmentExpansion, FleetError};

/// Expands `$VAR` / `%VAR%` references by echoing them through the node's
/// shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

#[async_trait]
impl EnvironmentExpansion for Echo {
    async fn expand(
        &self,
        runner: &dyn CommandRunner,
        template: &str,
    ) -> Result<String, FleetError> {
        let command = format!("echo {template}");
        let result = runner.execute(&command, CommandOptions::shell()).await?;
        if !result.is_success() {
            return Err(FleetError::CommandFailed {
                command,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(result.stdout.trim().to_string())
    }
}

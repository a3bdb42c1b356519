use std::collections::{HashMap, HashSet};

use crate::{
    command::{Command, CommandContext, CommandDescriptor, CommandFactory, CommandSpec, Options},
    errors::Error,
    Result,
};

/// A constructed, initialised command together with its metadata.
pub struct RegisteredCommand {
    pub descriptor: CommandDescriptor,
    pub options: Options,
    pub handler: Box<dyn Command>,
}

/// Commands indexed by invocation name, kept in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<RegisteredCommand>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a registration table.
    ///
    /// Names are validated for uniqueness before any handler is constructed.
    pub fn build(specs: Vec<CommandSpec>, ctx: &CommandContext) -> Result<Self> {
        let mut seen = HashSet::new();
        for spec in &specs {
            validate_name(&spec.descriptor.name)?;
            if !seen.insert(spec.descriptor.name.as_str()) {
                return Err(Error::DuplicateCommand {
                    name: spec.descriptor.name.clone(),
                });
            }
        }

        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec.descriptor, spec.factory, ctx)?;
        }
        Ok(registry)
    }

    /// Construct a command through `factory` and register it under `descriptor.name`.
    pub fn register(
        &mut self,
        descriptor: CommandDescriptor,
        factory: CommandFactory,
        ctx: &CommandContext,
    ) -> Result<()> {
        self.check_available(&descriptor.name)?;
        self.register_instance(descriptor, factory(ctx.clone()))
    }

    /// Register an already constructed handler; runs `init` and `init_options`.
    pub fn register_instance(
        &mut self,
        descriptor: CommandDescriptor,
        mut handler: Box<dyn Command>,
    ) -> Result<()> {
        self.check_available(&descriptor.name)?;

        handler.init()?;
        let mut options = Options::default();
        handler.init_options(&mut options);

        tracing::debug!(command = %descriptor.name, access = %descriptor.access, "registered command");
        self.by_name
            .insert(descriptor.name.clone(), self.commands.len());
        self.commands.push(RegisteredCommand {
            descriptor,
            options,
            handler,
        });
        Ok(())
    }

    fn check_available(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateCommand {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Exact, case-sensitive lookup by invocation name.
    pub fn resolve(&self, name: &str) -> Option<&RegisteredCommand> {
        self.by_name.get(name).map(|&i| &self.commands[i])
    }

    /// All commands in registration order.
    pub fn all(&self) -> impl Iterator<Item = &RegisteredCommand> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_whitespace() && c != '@' && c != '/');
    if !ok {
        return Err(Error::Config(format!("invalid command name: {name:?}")));
    }
    Ok(())
}

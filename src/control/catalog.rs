//! Command catalog
//!
//! Immutable table of every command the robot accepts, built once at first
//! use. Lookups are case-sensitive on the canonical command name and listing
//! preserves declaration order.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::envelope::{Family, PRIORITY_ELEVATED, PRIORITY_NORMAL};
use super::error::{CatalogError, CatalogResult};

/// Process-wide catalog instance
static CATALOG: OnceLock<Catalog> = OnceLock::new();

/// Type accepted by a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// `true` or `false`
    Boolean,
    /// Any finite real number
    Number,
}

impl FieldType {
    /// Human-readable name used in error messages
    pub fn describe(self) -> &'static str {
        match self {
            FieldType::Boolean => "a boolean",
            FieldType::Number => "a finite number",
        }
    }

    /// Check whether `value` is acceptable for this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Boolean => value.is_boolean(),
            FieldType::Number => value.as_f64().is_some_and(f64::is_finite),
        }
    }
}

/// One named field of a parameter schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    /// Field name as it appears in the payload
    pub name: &'static str,
    /// Accepted type
    pub kind: FieldType,
}

impl FieldSpec {
    fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldType::Number,
        }
    }

    fn boolean(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldType::Boolean,
        }
    }
}

/// Behavioural grouping used for conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Posture changes and tricks; these pre-empt a velocity stream
    Stance,
    /// Gaze, gait and speed settings that can run alongside motion
    Adjustment,
    /// Velocity commands
    Velocity,
}

/// Definition of a single command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    /// Canonical, unique name
    pub name: &'static str,
    /// Action identifier placed in the request header
    pub action_id: u32,
    /// Ordered parameter schema, empty for argument-less commands
    pub parameters: Vec<FieldSpec>,
    /// Priority used when the call carries no override
    pub default_priority: u8,
    /// Whether the command must be re-issued to stay in effect
    pub continuous: bool,
    /// Destination family
    pub family: Family,
    /// Conflict category
    pub category: Category,
}

impl CommandSpec {
    fn new(name: &'static str, action_id: u32, category: Category) -> Self {
        Self {
            name,
            action_id,
            parameters: Vec::new(),
            default_priority: PRIORITY_NORMAL,
            continuous: false,
            family: Family::Sport,
            category,
        }
    }

    fn stance(name: &'static str, action_id: u32) -> Self {
        Self::new(name, action_id, Category::Stance)
    }

    fn adjust(name: &'static str, action_id: u32) -> Self {
        Self::new(name, action_id, Category::Adjustment)
    }

    fn field(mut self, field: FieldSpec) -> Self {
        self.parameters.push(field);
        self
    }

    fn xyz(self) -> Self {
        self.field(FieldSpec::number("x"))
            .field(FieldSpec::number("y"))
            .field(FieldSpec::number("z"))
    }

    fn family(mut self, family: Family) -> Self {
        self.family = family;
        self
    }

    /// Whether the command takes no arguments
    pub fn takes_no_arguments(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Look up a schema field by name
    pub fn field_named(&self, name: &str) -> Option<&FieldSpec> {
        self.parameters.iter().find(|field| field.name == name)
    }

    /// Whether issuing this command must first halt a running velocity stream
    pub fn preempts_streams(&self) -> bool {
        !self.continuous && self.category == Category::Stance
    }
}

/// Name of the continuous velocity command
pub const MOVE: &str = "move";

/// Immutable command table
#[derive(Debug)]
pub struct Catalog {
    commands: Vec<CommandSpec>,
    by_name: HashMap<&'static str, usize>,
}

impl Catalog {
    /// Access the process-wide catalog
    pub fn global() -> &'static Catalog {
        CATALOG.get_or_init(Catalog::builtin)
    }

    /// Build the table of robot commands
    pub fn builtin() -> Catalog {
        let mut velocity = CommandSpec::new(MOVE, 1008, Category::Velocity).xyz();
        velocity.continuous = true;
        velocity.default_priority = PRIORITY_ELEVATED;

        Catalog::from_specs(vec![
            CommandSpec::stance("damp", 1001),
            CommandSpec::stance("balanceStand", 1002),
            CommandSpec::stance("stopMove", 1003),
            CommandSpec::stance("standUp", 1004),
            CommandSpec::stance("standDown", 1005),
            CommandSpec::stance("recoveryStand", 1006),
            CommandSpec::adjust("euler", 1007).xyz(),
            velocity,
            CommandSpec::stance("sitDown", 1009),
            CommandSpec::stance("riseSit", 1010),
            CommandSpec::adjust("switchGait", 1011).field(FieldSpec::number("d")),
            CommandSpec::stance("trigger", 1012),
            CommandSpec::adjust("bodyHeight", 1013).field(FieldSpec::number("data")),
            CommandSpec::adjust("footRaiseHeight", 1014).field(FieldSpec::number("data")),
            CommandSpec::adjust("setSpeedLevel", 1015).field(FieldSpec::number("data")),
            CommandSpec::stance("hello", 1016),
            CommandSpec::stance("stretch", 1017),
            CommandSpec::adjust("continuousGait", 1019).field(FieldSpec::boolean("flag")),
            CommandSpec::stance("content", 1020),
            CommandSpec::stance("wallow", 1021),
            CommandSpec::stance("dance1", 1022),
            CommandSpec::stance("dance2", 1023),
            CommandSpec::adjust("switchJoystick", 1027).field(FieldSpec::boolean("flag")),
            CommandSpec::stance("pose", 1028)
                .field(FieldSpec::boolean("flag")),
            CommandSpec::stance("scrape", 1029),
            CommandSpec::stance("frontFlip", 1030),
            CommandSpec::stance("frontJump", 1031),
            CommandSpec::stance("frontPounce", 1032),
            CommandSpec::stance("wiggleHips", 1033),
            CommandSpec::adjust("economicGait", 1035).field(FieldSpec::boolean("flag")),
            CommandSpec::stance("fingerHeart", 1036),
            CommandSpec::stance("setHandstand", 1301).field(FieldSpec::boolean("flag")),
            CommandSpec::stance("crossStep", 1302),
            CommandSpec::stance("onesidedStep", 1303),
            CommandSpec::stance("bound", 1304),
            CommandSpec::adjust("setObstacleAvoidance", 1001)
                .field(FieldSpec::boolean("enable"))
                .family(Family::ObstacleAvoidance),
        ])
    }

    /// Build a catalog from an explicit list of specs
    ///
    /// Panics if two specs share a name, or share an action id within a family.
    /// The table is static data, so a duplicate is a programming error.
    fn from_specs(commands: Vec<CommandSpec>) -> Catalog {
        let mut by_name = HashMap::with_capacity(commands.len());
        let mut actions = HashSet::with_capacity(commands.len());

        for (index, spec) in commands.iter().enumerate() {
            assert!(
                by_name.insert(spec.name, index).is_none(),
                "duplicate command name '{}'",
                spec.name
            );
            assert!(
                actions.insert((spec.family, spec.action_id)),
                "duplicate action id {} in family {:?}",
                spec.action_id,
                spec.family
            );
        }

        Catalog { commands, by_name }
    }

    /// Find a command by its canonical name
    pub fn lookup(&self, name: &str) -> CatalogResult<&CommandSpec> {
        self.by_name
            .get(name)
            .map(|&index| &self.commands[index])
            .ok_or_else(|| CatalogError::UnknownCommand(name.to_string()))
    }

    /// Find a command by family and action id
    pub fn by_action(&self, family: Family, action_id: u32) -> Option<&CommandSpec> {
        self.commands
            .iter()
            .find(|spec| spec.family == family && spec.action_id == action_id)
    }

    /// All commands in declaration order
    pub fn all_commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_exact_and_case_sensitive() {
        let catalog = Catalog::global();
        assert_eq!(catalog.lookup("standUp").unwrap().action_id, 1004);
        assert_eq!(
            catalog.lookup("standup"),
            Err(CatalogError::UnknownCommand("standup".to_string()))
        );
        assert!(catalog.lookup("danc3").is_err());
    }

    #[test]
    fn test_only_move_is_continuous() {
        let continuous: Vec<_> = Catalog::global()
            .all_commands()
            .iter()
            .filter(|spec| spec.continuous)
            .map(|spec| spec.name)
            .collect();
        assert_eq!(continuous, vec![MOVE]);

        let velocity = Catalog::global().lookup(MOVE).unwrap();
        assert_eq!(velocity.default_priority, PRIORITY_ELEVATED);
        assert!(!velocity.preempts_streams());
    }

    #[test]
    fn test_listing_preserves_declaration_order() {
        let names: Vec<_> = Catalog::global()
            .all_commands()
            .iter()
            .map(|spec| spec.name)
            .take(4)
            .collect();
        assert_eq!(names, vec!["damp", "balanceStand", "stopMove", "standUp"]);
        assert_eq!(
            Catalog::global().all_commands().last().unwrap().name,
            "setObstacleAvoidance"
        );
    }

    #[test]
    fn test_obstacle_family_is_a_static_attribute() {
        let catalog = Catalog::global();
        let toggle = catalog.lookup("setObstacleAvoidance").unwrap();
        let damp = catalog.lookup("damp").unwrap();
        assert_eq!(toggle.action_id, damp.action_id);
        assert_eq!(toggle.family, Family::ObstacleAvoidance);
        assert_eq!(damp.family, Family::Sport);
        assert_eq!(
            catalog.by_action(Family::ObstacleAvoidance, 1001).unwrap().name,
            "setObstacleAvoidance"
        );
    }

    #[test]
    fn test_schema_shapes() {
        let catalog = Catalog::global();
        assert!(catalog.lookup("sitDown").unwrap().takes_no_arguments());

        let euler = catalog.lookup("euler").unwrap();
        let names: Vec<_> = euler.parameters.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert!(!euler.preempts_streams());

        let handstand = catalog.lookup("setHandstand").unwrap();
        assert_eq!(handstand.field_named("flag").unwrap().kind, FieldType::Boolean);
        assert!(handstand.preempts_streams());
    }

    #[test]
    #[should_panic(expected = "duplicate action id")]
    fn test_duplicate_action_ids_rejected() {
        Catalog::from_specs(vec![
            CommandSpec::stance("a", 1),
            CommandSpec::stance("b", 1),
        ]);
    }

    #[test]
    fn test_field_type_acceptance() {
        assert!(FieldType::Number.accepts(&serde_json::json!(-0.1)));
        assert!(FieldType::Number.accepts(&serde_json::json!(3)));
        assert!(!FieldType::Number.accepts(&serde_json::json!("a")));
        assert!(!FieldType::Number.accepts(&serde_json::json!(true)));
        assert!(FieldType::Boolean.accepts(&serde_json::json!(false)));
        assert!(!FieldType::Boolean.accepts(&serde_json::json!(0)));
    }
}

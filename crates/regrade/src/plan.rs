//! Migration planning - turn a bag of diff steps into a safe execution order.
//!
//! The diff engine reports *what* has to change; this module decides *when*.
//! Two ordered buckets come out:
//!
//! - `safe`: steps that cannot discard data, ordered so that every statement
//!   only refers to objects that already exist (tables before the foreign
//!   keys that reference them, columns before the indexes that cover them,
//!   constraint drops before anything they would block).
//! - `destructive`: DropColumn, DropTable and narrowing type changes, plus
//!   the constraint drops that only exist to unblock them. The executor
//!   refuses this bucket without an explicit override.
//!
//! Foreign keys are always attached after every CreateTable, so a cycle of
//! foreign keys between new tables never blocks creation: the cycle only
//! costs the nicety of dependency-ordered CREATE TABLE statements.

use crate::diff::MigrationStep;
use crate::error::{Error, Result};
use regrade_db_schema::{Constraint, Schema};
use std::collections::{HashMap, HashSet, VecDeque};

/// An ordered migration plan, split into safe and destructive buckets.
///
/// Executing `safe` followed by `destructive` transforms the actual schema
/// into the desired one; executing `safe` alone performs every change that
/// cannot lose data.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub safe: Vec<MigrationStep>,
    pub destructive: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Returns true if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.safe.is_empty() && self.destructive.is_empty()
    }

    /// Total number of steps across both buckets.
    pub fn len(&self) -> usize {
        self.safe.len() + self.destructive.len()
    }

    /// Iterate over all steps in execution order (safe, then destructive).
    pub fn steps(&self) -> impl Iterator<Item = &MigrationStep> {
        self.safe.iter().chain(self.destructive.iter())
    }

    /// Render the full plan as SQL.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for step in &self.safe {
            sql.push_str(&step.to_sql());
            sql.push('\n');
        }
        if !self.destructive.is_empty() {
            sql.push_str("-- destructive\n");
            for step in &self.destructive {
                sql.push_str(&step.to_sql());
                sql.push('\n');
            }
        }
        sql
    }
}

impl std::fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
            return Ok(());
        }
        if !self.safe.is_empty() {
            writeln!(f, "Safe changes:")?;
            for step in &self.safe {
                writeln!(f, "  {}", step)?;
            }
        }
        if !self.destructive.is_empty() {
            writeln!(f, "Destructive changes (require explicit opt-in):")?;
            for step in &self.destructive {
                writeln!(f, "  {}", step)?;
            }
        }
        Ok(())
    }
}

/// Order diff steps into a [`MigrationPlan`].
///
/// `actual` is the introspected schema the steps were diffed against; it is
/// needed to synthesize the foreign key drops that unblock table drops.
pub fn plan(steps: Vec<MigrationStep>, actual: &Schema) -> Result<MigrationPlan> {
    let mut drop_constraints = Vec::new();
    let mut drop_indexes = Vec::new();
    let mut renames = Vec::new();
    let mut creates = Vec::new();
    let mut add_columns = Vec::new();
    let mut widening_alters = Vec::new();
    let mut column_tweaks = Vec::new();
    let mut add_constraints = Vec::new();
    let mut create_indexes = Vec::new();
    let mut drop_columns = Vec::new();
    let mut narrowing_alters = Vec::new();
    let mut drop_tables = Vec::new();

    for step in steps {
        match step {
            MigrationStep::DropConstraint { .. } => drop_constraints.push(step),
            MigrationStep::DropIndex { .. } => drop_indexes.push(step),
            MigrationStep::RenameTable { .. } => renames.push(step),
            MigrationStep::CreateTable(_) => creates.push(step),
            MigrationStep::AddColumn { .. } => add_columns.push(step),
            MigrationStep::AlterColumnType { .. } => {
                if step.is_destructive() {
                    narrowing_alters.push(step);
                } else {
                    widening_alters.push(step);
                }
            }
            MigrationStep::AlterColumnNullable { .. }
            | MigrationStep::AlterColumnDefault { .. }
            | MigrationStep::AlterColumnIdentity { .. } => column_tweaks.push(step),
            MigrationStep::AddConstraint { .. } => add_constraints.push(step),
            MigrationStep::CreateIndex { .. } => create_indexes.push(step),
            MigrationStep::DropColumn { .. } => drop_columns.push(step),
            MigrationStep::DropTable(_) => drop_tables.push(step),
        }
    }

    order_creates(&mut creates, &add_constraints)?;

    // Dropping a primary key that foreign keys still point at fails, so
    // constraint drops run in reverse dependency order: fk, unique, check, pk.
    drop_constraints.sort_by_key(|step| match step {
        MigrationStep::DropConstraint { constraint, .. } => constraint_rank(constraint, true),
        _ => 0,
    });

    // Mirror image for adds: pk and unique before the foreign keys that may
    // reference them, checks in between.
    add_constraints.sort_by_key(|step| match step {
        MigrationStep::AddConstraint { constraint, .. } => constraint_rank(constraint, false),
        _ => 0,
    });

    // Tables being dropped may reference each other; those foreign keys have
    // to go first or the drops would have to be ordered, which is impossible
    // when they form a cycle. The drops only belong in the destructive bucket:
    // if table drops are withheld, their foreign keys must survive too.
    let dropped: HashSet<&str> = drop_tables
        .iter()
        .filter_map(|step| match step {
            MigrationStep::DropTable(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    let mut unblocking_drops = Vec::new();
    for table in actual.iter_tables() {
        if !dropped.contains(table.name.as_str()) {
            continue;
        }
        for constraint in &table.constraints {
            let references_dropped = matches!(
                constraint,
                Constraint::ForeignKey(fk) if dropped.contains(fk.references_table.as_str())
            );
            if references_dropped {
                unblocking_drops.push(MigrationStep::DropConstraint {
                    table: table.name.clone(),
                    constraint: constraint.clone(),
                });
            }
        }
    }

    let mut safe = Vec::new();
    safe.extend(drop_constraints);
    safe.extend(drop_indexes);
    safe.extend(renames);
    safe.extend(creates);
    safe.extend(add_columns);
    safe.extend(widening_alters);
    safe.extend(column_tweaks);
    safe.extend(add_constraints);
    safe.extend(create_indexes);

    let mut destructive = Vec::new();
    destructive.extend(unblocking_drops);
    destructive.extend(drop_columns);
    destructive.extend(narrowing_alters);
    destructive.extend(drop_tables);

    Ok(MigrationPlan { safe, destructive })
}

fn constraint_rank(constraint: &Constraint, dropping: bool) -> u8 {
    let rank = match constraint {
        Constraint::PrimaryKey { .. } => 0,
        Constraint::Unique { .. } => 1,
        Constraint::Check { .. } => 2,
        Constraint::ForeignKey(_) => 3,
    };
    if dropping { 3 - rank } else { rank }
}

/// Order CreateTable steps so referenced tables come before referencing ones.
///
/// Falls back to declaration order when the foreign keys between new tables
/// form a cycle; that is sound because foreign keys are attached in a second
/// pass, after every table exists.
fn order_creates(creates: &mut [MigrationStep], add_constraints: &[MigrationStep]) -> Result<()> {
    let names: Vec<String> = creates
        .iter()
        .filter_map(|step| match step {
            MigrationStep::CreateTable(table) => Some(table.name.clone()),
            _ => None,
        })
        .collect();
    if names.len() < 2 {
        return Ok(());
    }
    let created: HashSet<&str> = names.iter().map(String::as_str).collect();

    // Edge (a, b): a must be created before b.
    let mut edges = Vec::new();
    for step in add_constraints {
        if let MigrationStep::AddConstraint {
            table,
            constraint: Constraint::ForeignKey(fk),
        } = step
            && created.contains(table.as_str())
            && created.contains(fk.references_table.as_str())
            && *table != fk.references_table
        {
            edges.push((fk.references_table.clone(), table.clone()));
        }
    }

    let order = match toposort(&names, &edges) {
        Ok(order) => order,
        Err(Error::CyclicDependency { tables }) => {
            tracing::debug!(
                ?tables,
                "cyclic foreign keys between new tables; falling back to two-phase creation"
            );
            names.clone()
        }
        Err(other) => return Err(other),
    };

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    creates.sort_by_key(|step| match step {
        MigrationStep::CreateTable(table) => position.get(table.name.as_str()).copied(),
        _ => None,
    });
    Ok(())
}

/// Kahn's algorithm, stable with respect to the input node order.
fn toposort(nodes: &[String], edges: &[(String, String)]) -> Result<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for (before, after) in edges {
        successors
            .entry(before.as_str())
            .or_default()
            .push(after.as_str());
        if let Some(count) = indegree.get_mut(after.as_str()) {
            *count += 1;
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(String::as_str)
        .filter(|n| indegree[n] == 0)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        for successor in successors.get(node).into_iter().flatten().copied() {
            if let Some(count) = indegree.get_mut(successor) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(successor);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let remaining: Vec<String> = nodes
            .iter()
            .filter(|n| !order.contains(n))
            .cloned()
            .collect();
        return Err(Error::CyclicDependency { tables: remaining });
    }
    Ok(order)
}

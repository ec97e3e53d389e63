use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use structopt::StructOpt;
use tracing::debug;

use parque_core::{ActorId, Clock, MaterialId};
use parque_events::{MovementAction, MovementFilter};
use parque_infra::{InventoryService, InventoryStore, JsonFileStore, NewMaterial, StoreConfig};
use parque_inventory::MaterialRef;

mod render;

#[derive(Debug, StructOpt)]
#[structopt(name = "parque", about = "Depot equipment ledger and movement log")]
struct Opt {
    /// Data directory (overrides PARQUE_DATA_DIR)
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

// Who is recording the movement, and why.
#[derive(Debug, StructOpt)]
struct Signed {
    #[structopt(long, short = "u")]
    actor: ActorId,

    /// Free-text note stored with the movement
    #[structopt(long, short)]
    note: Option<String>,
}

#[derive(Debug, StructOpt)]
struct Target {
    /// Material name or id
    material: String,

    /// Category, needed when the name exists in more than one
    #[structopt(long, short)]
    category: Option<String>,
}

impl Target {
    fn to_ref(&self) -> MaterialRef {
        match &self.category {
            Some(category) => MaterialRef::in_category(category, &self.material),
            None => match self.material.parse::<MaterialId>() {
                Ok(id) => MaterialRef::Id(id),
                Err(_) => MaterialRef::name(&self.material),
            },
        }
    }
}

#[derive(Debug, StructOpt)]
struct Move {
    #[structopt(flatten)]
    target: Target,

    quantity: i64,

    #[structopt(flatten)]
    by: Signed,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print the current catalog
    Snapshot {
        #[structopt(long)]
        json: bool,
    },
    /// Issue units from the depot
    Checkout(Move),
    /// Take checked-out units back
    #[structopt(name = "return")]
    Return(Move),
    /// Mark units as not operational
    Inoperative {
        #[structopt(flatten)]
        movement: Move,

        /// Also take the units out of the depot
        #[structopt(long)]
        remove: bool,
    },
    /// Mark repaired units as operational again
    Repair(Move),
    /// Add a material to the catalog
    Add {
        name: String,
        total: i64,

        #[structopt(long, short)]
        category: Option<String>,

        #[structopt(long)]
        unit: Option<String>,

        #[structopt(flatten)]
        by: Signed,
    },
    /// Change the nominal total of a material
    Revise {
        #[structopt(flatten)]
        target: Target,

        new_total: i64,

        #[structopt(flatten)]
        by: Signed,
    },
    /// Rename a material, keeping its history
    Rename {
        #[structopt(flatten)]
        target: Target,

        new_name: String,

        #[structopt(flatten)]
        by: Signed,
    },
    /// List movements, newest first
    History {
        #[structopt(long, short = "u")]
        actor: Option<ActorId>,

        #[structopt(long)]
        material: Option<String>,

        #[structopt(long, short)]
        category: Option<String>,

        /// checkout, return, mark_inoperative, mark_operational, add_material, revise_total, rename_material
        #[structopt(long)]
        action: Option<MovementAction>,

        #[structopt(long)]
        limit: Option<usize>,

        #[structopt(long)]
        json: bool,
    },
    /// List everyone who has recorded a movement
    Actors,
}

fn main() -> anyhow::Result<()> {
    parque_observability::init();
    let opt = Opt::from_args();

    let mut config = StoreConfig::from_env().context("reading configuration")?;
    if let Some(dir) = opt.data_dir {
        config.data_dir = dir;
    }
    let store = JsonFileStore::open(&config)
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    debug!(data_dir = %store.data_dir().display(), "store ready");

    let service = InventoryService::new(store);
    let stdout = std::io::stdout();
    run(&service, opt.command, &mut stdout.lock())
}

fn run<S, C>(
    service: &InventoryService<S, C>,
    command: Command,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    S: InventoryStore,
    C: Clock,
{
    match command {
        Command::Snapshot { json } => {
            let snapshot = service.snapshot()?;
            if json {
                serde_json::to_writer_pretty(&mut *out, &snapshot)?;
                writeln!(out)?;
            } else {
                write!(out, "{}", render::snapshot_table(&snapshot))?;
            }
        }
        Command::Checkout(m) => {
            let view = service.checkout(
                &m.by.actor,
                &m.target.to_ref(),
                m.quantity,
                m.by.note.as_deref(),
            )?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::Return(m) => {
            let view = service.return_item(
                &m.by.actor,
                &m.target.to_ref(),
                m.quantity,
                m.by.note.as_deref(),
            )?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::Inoperative { movement: m, remove } => {
            let view = service.mark_inoperative(
                &m.by.actor,
                &m.target.to_ref(),
                m.quantity,
                remove,
                m.by.note.as_deref(),
            )?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::Repair(m) => {
            let view = service.mark_operational(
                &m.by.actor,
                &m.target.to_ref(),
                m.quantity,
                m.by.note.as_deref(),
            )?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::Add {
            name,
            total,
            category,
            unit,
            by,
        } => {
            let material = NewMaterial {
                name,
                category,
                total_quantity: total,
                unit,
            };
            let view = service.add_material(&by.actor, material, by.note.as_deref())?;
            writeln!(out, "added {} ({})", render::material_line(&view), view.id)?;
        }
        Command::Revise {
            target,
            new_total,
            by,
        } => {
            let view =
                service.revise_total(&by.actor, &target.to_ref(), new_total, by.note.as_deref())?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::Rename {
            target,
            new_name,
            by,
        } => {
            let view = service.rename_material(
                &by.actor,
                &target.to_ref(),
                &new_name,
                by.note.as_deref(),
            )?;
            writeln!(out, "{}", render::material_line(&view))?;
        }
        Command::History {
            actor,
            material,
            category,
            action,
            limit,
            json,
        } => {
            let mut filter = MovementFilter {
                actor,
                material: None,
                action,
            };
            if let Some(material) = material {
                let target = Target { material, category };
                filter.material = Some(service.material(&target.to_ref())?.id);
            }
            let movements = service.query(filter)?.take(limit.unwrap_or(usize::MAX));
            if json {
                let movements: Vec<_> = movements.collect();
                serde_json::to_writer_pretty(&mut *out, &movements)?;
                writeln!(out)?;
            } else {
                for event in movements {
                    writeln!(out, "{}", render::movement_line(&event))?;
                }
            }
        }
        Command::Actors => {
            for actor in service.actors()? {
                writeln!(out, "{actor}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parque_core::FixedClock;
    use parque_infra::InMemoryInventoryStore;
    use parque_inventory::default_catalog;

    fn service() -> InventoryService<InMemoryInventoryStore, FixedClock> {
        InventoryService::with_clock(
            InMemoryInventoryStore::with_materials(default_catalog()),
            FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
        )
    }

    fn exec(
        service: &InventoryService<InMemoryInventoryStore, FixedClock>,
        args: &[&str],
    ) -> anyhow::Result<String> {
        let opt = Opt::from_iter_safe(std::iter::once("parque").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(service, opt.command, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn checkout_then_history() {
        let svc = service();
        let out = exec(
            &svc,
            &["checkout", "Pala inglesa", "3", "-u", "alice", "-n", "obra norte"],
        )
        .unwrap();
        assert!(out.contains("in depot 7, checked out 3"));

        exec(&svc, &["return", "Pala inglesa", "1", "--actor", "bob"]).unwrap();

        let history = exec(&svc, &["history"]).unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("return"));
        assert!(lines[1].ends_with("(obra norte)"));

        let alice_only = exec(&svc, &["history", "--actor", "alice"]).unwrap();
        assert_eq!(alice_only.lines().count(), 1);

        assert_eq!(exec(&svc, &["actors"]).unwrap(), "alice\nbob\n");
    }

    #[test]
    fn history_filters_by_material_and_action() {
        let svc = service();
        exec(&svc, &["checkout", "Almádena", "1", "-u", "alice"]).unwrap();
        exec(&svc, &["checkout", "Pala inglesa", "1", "-u", "alice"]).unwrap();
        exec(&svc, &["inoperative", "Pala inglesa", "1", "--remove", "-u", "alice"]).unwrap();

        let pala = exec(&svc, &["history", "--material", "Pala inglesa", "--json"]).unwrap();
        let events: serde_json::Value = serde_json::from_str(&pala).unwrap();
        assert_eq!(events.as_array().unwrap().len(), 2);

        let broken = exec(&svc, &["history", "--action", "mark-inoperative"]).unwrap();
        assert_eq!(broken.lines().count(), 1);
        assert!(broken.contains("(removed from depot)"));
    }

    #[test]
    fn rejected_movement_surfaces_ledger_error() {
        let svc = service();
        let err = exec(&svc, &["checkout", "Motosierra Stihl", "2", "-u", "alice"]).unwrap_err();
        assert!(err.to_string().contains("insufficient stock"));
        assert_eq!(exec(&svc, &["history"]).unwrap(), "");
    }

    #[test]
    fn add_and_rename_in_category() {
        let svc = service();
        let out = exec(
            &svc,
            &["add", "Casco", "6", "-c", "protección", "--unit", "uds", "-u", "admin"],
        )
        .unwrap();
        assert!(out.starts_with("added protección/Casco: total 6"));

        exec(
            &svc,
            &["rename", "Casco", "-c", "protección", "Casco de obra", "-u", "admin"],
        )
        .unwrap();
        let snapshot = svc.snapshot().unwrap();
        assert!(snapshot.get("protección", "Casco de obra").is_some());
    }

    #[test]
    fn actor_is_required_for_movements() {
        assert!(Opt::from_iter_safe(["parque", "checkout", "Pala inglesa", "1"]).is_err());
        assert!(Opt::from_iter_safe(["parque", "checkout", "Pala inglesa", "1", "-u", "  "]).is_err());
    }
}

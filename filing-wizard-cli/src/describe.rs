//! Catalogue listings

use colored::Colorize;

use filing_wizard_core::{Guard, RuleCheck, ServiceCatalog, ServiceConfig, StepKind};

pub fn print_services(catalog: &ServiceCatalog) {
    for service in catalog.services() {
        println!(
            "{:<24} {} ({} steps)",
            service.key().cyan(),
            service.def.title,
            service.total_steps()
        );
    }
}

pub fn print_service(service: &ServiceConfig) {
    let def = &service.def;
    println!("{} {}", def.title.bold(), format!("[{}]", def.service).as_str().dimmed());
    if !def.description.is_empty() {
        println!("{}", def.description);
    }

    println!("\n{}", "Plans".underline());
    for plan in &def.plans {
        let price = plan.price.map(|p| format!("₹{p}")).unwrap_or_else(|| "-".into());
        let default = if def.fallback_plan() == Some(plan.id.as_str()) { " (default)" } else { "" };
        println!("  {:<10} {:<40} {price}{default}", plan.id, plan.label);
    }

    for (i, step) in service.steps().iter().enumerate() {
        let kind = match step.def.kind {
            StepKind::Form => "",
            StepKind::PlanSelection => " [plan selection]",
            StepKind::Review => " [review]",
        };
        println!("\n{} {}{kind}", format!("Step {}:", i + 1).as_str().bold(), step.def.title);

        for field in &step.def.fields {
            let mut line = format!("  - {} ({:?})", field.name, field.kind);
            if service.is_derived(&field.name) {
                line.push_str(" derived");
            }
            if !field.options.is_empty() {
                line.push_str(&format!(" one of [{}]", field.options.join(", ")));
            }
            if let Some(guard) = &field.visible_when {
                line.push_str(&format!(" shown when {}", guard_text(guard)));
            }
            println!("{line}");
        }

        for rule in &step.def.rules {
            let mut line = format!("    rule {}: {}", rule.field, check_text(&rule.check));
            if rule.optional {
                line.push_str(" (if given)");
            }
            if let Some(guard) = &rule.when {
                line.push_str(&format!(" when {}", guard_text(guard)));
            }
            println!("{}", line.as_str().dimmed());
        }

        for slot in &step.def.uploads {
            let required = if slot.required { "required" } else { "optional" };
            let mut line = format!("  * upload {} [{}] {required}", slot.slot, slot.category);
            if let Some(guard) = &slot.visible_when {
                line.push_str(&format!(" when {}", guard_text(guard)));
            }
            println!("{line}");
        }
    }

    if !service.derived_fields().is_empty() {
        println!("\n{}", "Derived fields".underline());
        for d in service.derived_fields() {
            println!(
                "  {} <- {} ({})",
                d.field,
                d.derivation.name(),
                d.derivation.inputs().join(", ")
            );
        }
    }
}

fn check_text(check: &RuleCheck) -> String {
    match check {
        RuleCheck::Required => "required".into(),
        RuleCheck::ExactLength { len } => format!("exactly {len} characters"),
        RuleCheck::MinLength { len } => format!("at least {len} characters"),
        RuleCheck::MaxLength { len } => format!("at most {len} characters"),
        RuleCheck::Pattern { regex } => format!("matches /{regex}/"),
        RuleCheck::OneOf { values } => format!("one of [{}]", values.join(", ")),
        RuleCheck::Numeric => "numeric".into(),
        RuleCheck::Custom { predicate } => format!("valid {predicate}"),
    }
}

fn guard_text(guard: &Guard) -> String {
    match guard {
        Guard::FieldEquals { field, equals } => format!("{field} = {equals}"),
        Guard::FieldIn { field, values } => format!("{field} in [{}]", values.join(", ")),
        Guard::PlanIn { plan } => format!("plan in [{}]", plan.join(", ")),
        Guard::All { all } => all.iter().map(guard_text).collect::<Vec<_>>().join(" and "),
        Guard::Not { not } => format!("not ({})", guard_text(not)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_text() {
        let guard: Guard = serde_yaml::from_str(
            "all: [{ field: entityType, equals: Employer }, { not: { plan: [basic] } }]",
        )
        .unwrap();
        assert_eq!(guard_text(&guard), "entityType = Employer and not (plan in [basic])");
    }

    #[test]
    fn test_check_text() {
        assert_eq!(check_text(&RuleCheck::ExactLength { len: 21 }), "exactly 21 characters");
        assert_eq!(
            check_text(&RuleCheck::Custom {
                predicate: "gstin".into()
            }),
            "valid gstin"
        );
    }
}

use conform_domain::{Dependency, ResourceKind};
use conform_engine::reconcile;
use conform_policy::Policy;
use conform_provider::{
    FileTemplates, PackageManager, PasswdDb, ServiceManager, ShadowDb, SimulatedHost,
};
use conform_report::ActionOutcome;
use conform_resource::Resource;

fn resource(kind: ResourceKind, key: &str, attrs: &[(&str, &str)]) -> Resource {
    let mut r = Resource::new(kind, key);
    for (name, value) in attrs {
        r.set(name, value).unwrap();
    }
    r
}

#[test]
fn new_user_converges_in_one_run() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path().join("home/alice");
    let home_str = home.to_str().unwrap();

    let mut policy = Policy::new();
    policy
        .add(resource(
            ResourceKind::User,
            "alice",
            &[
                ("uid", "1001"),
                ("gid", "1001"),
                ("home", home_str),
                ("shell", "/bin/bash"),
            ],
        ))
        .unwrap();

    let mut sim = SimulatedHost::new();
    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();

    assert!(!outcome.failed());
    assert_eq!(outcome.fixes(), 1);
    assert_eq!(
        outcome.reports[0].summaries(),
        [
            "create user".to_string(),
            "set uid to 1001".to_string(),
            "set gid to 1001".to_string(),
            format!("set home directory to {}", home_str),
            "set login shell to /bin/bash".to_string(),
        ]
    );

    let stored = sim.passwd.get("alice").unwrap().unwrap();
    assert_eq!((stored.uid, stored.gid), (1001, 1001));

    // second run: nothing to do
    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert_eq!(outcome.fixes(), 0);
    assert!(outcome.reports.iter().all(|r| r.actions.is_empty()));
}

#[test]
fn absent_user_is_removed() {
    let mut sim = SimulatedHost::new();
    sim.passwd.create("bob", 1002, 1002).unwrap();
    sim.shadow.create("bob").unwrap();

    let mut policy = Policy::new();
    policy
        .add(resource(ResourceKind::User, "bob", &[("present", "no")]))
        .unwrap();

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert_eq!(outcome.reports[0].summaries(), ["remove user"]);
    assert!(sim.passwd.get("bob").unwrap().is_none());
}

#[test]
fn implicit_dependencies_order_user_dir_file() {
    let tmp = tempfile::tempdir().unwrap();
    let www = tmp.path().join("srv/www");
    let index = www.join("index.html");

    let mut policy = Policy::new();
    // insertion order is deliberately backwards
    policy
        .add(resource(
            ResourceKind::File,
            index.to_str().unwrap(),
            &[("owner", "web")],
        ))
        .unwrap();
    policy
        .add(resource(
            ResourceKind::Dir,
            www.to_str().unwrap(),
            &[("owner", "web")],
        ))
        .unwrap();
    policy.add(Resource::new(ResourceKind::User, "web")).unwrap();

    let mut sim = SimulatedHost::new();
    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), true).unwrap();

    let subjects: Vec<ResourceKind> = outcome.reports.iter().map(|r| r.kind).collect();
    assert_eq!(
        subjects,
        [ResourceKind::User, ResourceKind::Dir, ResourceKind::File]
    );
}

#[test]
fn content_change_notifies_dependent_service() {
    let tmp = tempfile::tempdir().unwrap();
    let master = tmp.path().join("app.conf.master");
    let conf = tmp.path().join("app.conf");
    std::fs::write(&master, "workers = 4\n").unwrap();
    std::fs::write(&conf, "workers = 1\n").unwrap();

    let mut sim = SimulatedHost::new();
    sim.services.set_running("app");

    let mut policy = Policy::new();
    let file = resource(
        ResourceKind::File,
        conf.to_str().unwrap(),
        &[("source", master.to_str().unwrap())],
    );
    let service = resource(ResourceKind::Service, "app", &[("running", "yes")]);
    let (file_id, service_id) = (file.id(), service.id());
    policy.add(file).unwrap();
    policy.add(service).unwrap();
    policy.add_dependency(Dependency::new(service_id, file_id));

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert!(!outcome.failed());

    assert_eq!(outcome.reports[0].summaries(), ["update content from master copy"]);
    assert_eq!(outcome.reports[1].summaries(), ["reload service (via dependency)"]);
    assert_eq!(sim.services.reloaded(), ["app"]);
    assert_eq!(std::fs::read_to_string(&conf).unwrap(), "workers = 4\n");

    // a converged second run must not reload again
    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert_eq!(outcome.fixes(), 0);
    assert_eq!(sim.services.reloaded(), ["app"]);
}

#[test]
fn unchanged_providers_do_not_notify() {
    let tmp = tempfile::tempdir().unwrap();
    let master = tmp.path().join("app.conf.master");
    let conf = tmp.path().join("app.conf");
    std::fs::write(&master, "workers = 4\n").unwrap();
    std::fs::write(&conf, "workers = 4\n").unwrap();

    let mut sim = SimulatedHost::new();
    sim.services.set_running("app");

    let mut policy = Policy::new();
    let file = resource(
        ResourceKind::File,
        conf.to_str().unwrap(),
        &[("source", master.to_str().unwrap())],
    );
    let service = resource(ResourceKind::Service, "app", &[("running", "yes")]);
    let (file_id, service_id) = (file.id(), service.id());
    policy.add(file).unwrap();
    policy.add(service).unwrap();
    policy.add_dependency(Dependency::new(service_id, file_id));

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert_eq!(outcome.fixes(), 0);
    assert!(sim.services.reloaded().is_empty());
}

#[test]
fn dry_run_reports_everything_and_changes_nothing() {
    let mut sim = SimulatedHost::new();
    sim.packages.set_candidate("nginx", "1.24.0");

    let mut policy = Policy::new();
    policy
        .add(resource(
            ResourceKind::User,
            "alice",
            &[("uid", "1001"), ("makehome", "no")],
        ))
        .unwrap();
    policy.add(Resource::new(ResourceKind::Package, "nginx")).unwrap();
    policy
        .add(resource(ResourceKind::Service, "nginx", &[("running", "yes")]))
        .unwrap();

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), true).unwrap();

    assert!(outcome.dry_run);
    assert_eq!(outcome.fixes(), 0);
    assert!(outcome
        .reports
        .iter()
        .flat_map(|r| r.actions.iter())
        .all(|a| a.outcome == ActionOutcome::Skipped));
    assert!(!outcome.reports.iter().any(|r| r.actions.is_empty()));

    assert!(sim.passwd.get("alice").unwrap().is_none());
    assert!(sim.packages.version("nginx").unwrap().is_none());
    assert!(!sim.services.running("nginx").unwrap());

    // an apply after the dry run sees the exact same decision tree
    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert_eq!(outcome.fixes(), 3);
}

#[test]
fn failed_inspection_yields_a_synthetic_report_and_continues() {
    let mut sim = SimulatedHost::new();
    sim.packages.set_candidate("nginx", "1.24.0");

    let mut policy = Policy::new();
    // MemorySysctl has no such parameter, so stat fails
    policy
        .add(resource(
            ResourceKind::Sysctl,
            "kernel.no_such_thing",
            &[("value", "1")],
        ))
        .unwrap();
    policy.add(Resource::new(ResourceKind::Package, "nginx")).unwrap();

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();

    assert!(outcome.failed());
    assert_eq!(outcome.reports.len(), 2);
    assert_eq!(outcome.reports[0].actions.len(), 1);
    assert_eq!(outcome.reports[0].actions[0].outcome, ActionOutcome::Failed);
    assert!(outcome.reports[0].actions[0].summary.starts_with("inspect"));

    // the failure did not stop the package from being handled
    assert_eq!(outcome.reports[1].summaries(), ["install package (latest version)"]);
    assert_eq!(sim.packages.version("nginx").unwrap().as_deref(), Some("1.24.0"));
}

#[test]
fn provider_failures_mark_the_run_failed() {
    let mut sim = SimulatedHost::new();
    // no candidate registered: the unpinned install will fail

    let mut policy = Policy::new();
    policy.add(Resource::new(ResourceKind::Package, "mystery")).unwrap();

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    assert!(outcome.failed());
    assert_eq!(outcome.reports[0].actions[0].outcome, ActionOutcome::Failed);
}

#[test]
fn run_records_carry_reports_in_order() {
    let mut sim = SimulatedHost::new();
    sim.packages.set_candidate("nginx", "1.24.0");

    let mut policy = Policy::new();
    policy.add(Resource::new(ResourceKind::Package, "nginx")).unwrap();
    policy
        .add(resource(ResourceKind::Sysctl, "vm.swappiness", &[("value", "10"), ("persist", "no")]))
        .unwrap();
    sim.kernel.insert("vm.swappiness", "60");

    let outcome = reconcile(&mut policy, &mut sim.env(), &FileTemplates::new(), false).unwrap();
    let record = outcome.record(None);

    assert_eq!(record.reports.len(), 2);
    assert_eq!(record.reports[0].kind, ResourceKind::Package);
    assert_eq!(record.reports[1].kind, ResourceKind::Sysctl);
    assert!(!record.failed());
    assert!(record.duration().num_seconds() >= 0);
}

#[test]
fn packed_policies_round_trip_between_master_and_agent() {
    let originals = vec![
        resource(
            ResourceKind::User,
            "alice",
            &[("uid", "1001"), ("shell", "/bin/zsh"), ("locked", "yes")],
        ),
        resource(ResourceKind::Group, "admins", &[("gid", "901"), ("member", "x"), ("member", "!b")]),
        resource(ResourceKind::Package, "nginx", &[("version", "1.24.0")]),
        resource(ResourceKind::Service, "nginx", &[("running", "yes"), ("enabled", "yes")]),
        resource(ResourceKind::Host, "db01", &[("ip", "10.0.0.5"), ("aliases", "db postgres")]),
        resource(ResourceKind::Sysctl, "vm.swappiness", &[("value", "10")]),
    ];

    for original in originals {
        let packed = original.pack();
        let decoded = Resource::unpack(&packed).unwrap();
        assert_eq!(decoded.kind(), original.kind());
        assert_eq!(decoded.key(), original.key());
        assert_eq!(decoded.pack(), packed, "{} did not round-trip", original.id());
    }
}

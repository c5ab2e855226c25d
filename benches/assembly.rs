use std::{collections::BTreeMap, hint::black_box};

use criterion::{criterion_group, criterion_main, Criterion};
use ketchup::prelude::*;

/// A linear pathway `S -> M1 -> ... -> Mn -> P` with one sequential bi-bi step per reaction.
fn pathway(length: usize) -> (MetabolicNetwork, Vec<MechanismRecord>) {
    let species: Vec<String> = (0..=length).map(|i| format!("M{i}")).collect();
    let mut metabolites: Vec<Metabolite> = species
        .iter()
        .enumerate()
        .map(|(i, id)| {
            MetaboliteBuilder::default()
                .id(id.as_str())
                .boundary(i == 0 || i == length)
                .build()
                .expect("Failed to build metabolite")
        })
        .collect();
    metabolites.push(MetaboliteBuilder::default().id("ATP").boundary(true).build().unwrap());
    metabolites.push(MetaboliteBuilder::default().id("ADP").boundary(true).build().unwrap());

    let mut reactions = vec![];
    let mut mechanisms = vec![];
    for (i, pair) in species.windows(2).enumerate() {
        let id = format!("R{i}");
        reactions.push(
            ReactionBuilder::default()
                .id(id.as_str())
                .to_reactants(ReactionElement::new(pair[0].as_str(), 1.0))
                .to_reactants(ReactionElement::new("ATP", 1.0))
                .to_products(ReactionElement::new(pair[1].as_str(), 1.0))
                .to_products(ReactionElement::new("ADP", 1.0))
                .build()
                .expect("Failed to build reaction"),
        );
        mechanisms.push(
            MechanismRecordBuilder::default()
                .reaction(id.as_str())
                .to_substrates(pair[0].as_str())
                .to_substrates("ATP")
                .to_products(pair[1].as_str())
                .to_products("ADP")
                .build()
                .expect("Failed to build mechanism"),
        );
    }

    let network = MetabolicNetwork::new(metabolites, reactions).expect("Invalid network");
    (network, mechanisms)
}

fn datasets(network: &MetabolicNetwork) -> Vec<Dataset> {
    let fluxes: BTreeMap<String, Measurement> = network
        .reactions
        .iter()
        .map(|r| (r.id.clone(), Measurement::new(1.0, 0.1)))
        .collect();

    let mut datasets = vec![Dataset::Static(StaticDataset {
        id: "WT".into(),
        fluxes: fluxes.clone(),
        perturbations: BTreeMap::new(),
    })];
    for reaction in network.reactions.iter().take(5) {
        datasets.push(Dataset::Static(StaticDataset {
            id: reaction.id.clone(),
            fluxes: fluxes.clone(),
            perturbations: BTreeMap::new(),
        }));
    }
    datasets
}

fn benchmark_assembly(c: &mut Criterion) {
    let (network, mechanisms) = pathway(20);
    let datasets = datasets(&network);
    let options = KetchupOptionsBuilder::default()
        .seed(0u64)
        .build()
        .expect("Failed to build options");

    c.bench_function("compose_elemental", |b| {
        b.iter(|| {
            let _ = black_box(
                ExperimentComposer::builder()
                    .network(black_box(&network))
                    .mechanisms(&mechanisms)
                    .datasets(&datasets)
                    .options(options.clone())
                    .build()
                    .compose(),
            );
        });
    });

    let composition = ExperimentComposer::builder()
        .network(&network)
        .mechanisms(&mechanisms)
        .datasets(&datasets)
        .options(options.clone())
        .build()
        .compose()
        .expect("Failed to compose model");
    let model = composition.model;
    let x = model.point();

    c.bench_function("jacobian", |b| {
        b.iter(|| {
            let _ = black_box(model.jacobian(black_box(&x)));
        });
    });
}

criterion_group!(benches, benchmark_assembly);
criterion_main!(benches);

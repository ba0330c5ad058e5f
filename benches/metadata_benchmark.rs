use criterion::{black_box, criterion_group, criterion_main, Criterion};
use usz_neuro_conversion::{MetadataTable, SessionKey};

const HEADER: &str = "Participant,Session,Age,Sex,Pathology,sEEG electrodes analysed,\
                      Electrodes in seizure onset zone (SOZ),Handedness,Date,\
                      Session Start Time,Dataset";

fn synthetic_table(subjects: u32, sessions: u32) -> String {
    let mut csv = String::from(HEADER);
    for subject in 1..=subjects {
        for session in 1..=sessions {
            csv.push_str(&format!(
                "\n{},{},{},m,Epilepsy,AHL1-AHL8,AHL1,R,2306{:02},{:02}:30,demo",
                subject,
                session,
                20 + subject % 50,
                1 + session % 28,
                8 + session % 10
            ));
        }
    }
    csv
}

pub fn bench_load_table(c: &mut Criterion) {
    let csv = synthetic_table(100, 10);
    c.bench_function("load_metadata_table", |b| {
        b.iter(|| {
            let table = MetadataTable::from_reader(black_box(csv.as_bytes()));
            black_box(table.is_ok())
        });
    });
}

pub fn bench_lookup(c: &mut Criterion) {
    let table = match MetadataTable::from_reader(synthetic_table(100, 10).as_bytes()) {
        Ok(table) => table,
        Err(e) => {
            println!("Skipping benchmark: {}", e);
            return;
        }
    };
    let key = SessionKey::new(57, 4, "demo");
    c.bench_function("lookup_metadata_row", |b| {
        b.iter(|| black_box(table.lookup(black_box(&key)).is_ok()));
    });
}

criterion_group!(benches, bench_load_table, bench_lookup);
criterion_main!(benches);

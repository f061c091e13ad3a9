// src/trainer.rs
//
// Epoch loop in the manner of the vanilla training recipe: per-step loss
// line, a validation sweep per epoch, metric reset at epoch boundaries,
// then a held-out evaluation pass inside a no-grad scope.

use crate::autograd::no_grad;
use crate::data::NamesData;
use crate::model::NgramModel;
use crate::module::Module;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 0, // 全量单批
        }
    }
}

pub fn train_model(model: &mut NgramModel, data: &NamesData, opts: &TrainOptions) {
    let num_steps = data.train.num_batches(opts.batch_size);
    tracing::info!(
        "Starting training: {} epochs, {} steps/epoch, lr={}",
        opts.epochs,
        num_steps,
        model.config.lr
    );

    for epoch in 0..opts.epochs {
        model.train_mode();
        for (step, batch) in data.train.batches(opts.batch_size).enumerate() {
            let loss = model.training_step(&batch);
            println!(
                "Epoch [{}/{}], Step [{}/{}], Loss: {}",
                epoch, opts.epochs, step, num_steps, loss
            );
        }

        no_grad(|| {
            for batch in data.val.batches(opts.batch_size) {
                model.validation_step(&batch);
            }
        });

        println!(
            "Epoch {} - Training Loss: {}",
            epoch,
            model.train_loss.compute()
        );
        println!(
            "Epoch {} - Validation Loss: {}",
            epoch,
            model.val_loss.compute()
        );
        model.train_loss.reset();
        model.val_loss.reset();
    }

    tracing::info!("Training complete");
}

pub fn evaluate_model(model: &mut NgramModel, data: &NamesData, opts: &TrainOptions) {
    no_grad(|| {
        for batch in data.test.batches(opts.batch_size) {
            model.test_step(&batch);
        }
    });
    println!("Test Loss: {}", model.test_loss.compute());
    model.test_loss.reset();
}
